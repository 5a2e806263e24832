//! Decarb Pathway - technology transition simulation for industrial asset stacks

pub mod core;
pub mod pathway;
