//! End-to-end run over the bundled sample data in `data/`

use std::path::PathBuf;

use decarb_pathway::core::{PathwayConfig, Technology, TechnologyClass};
use decarb_pathway::pathway::{ConstraintSpec, PathwayInputs, PathwayOutput, SimulationPathway, TransitionKind};

fn data_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data").join(name)
}

fn sample() -> (PathwayConfig, PathwayInputs) {
    let config = PathwayConfig::load(&data_path("config.toml")).unwrap();
    let inputs = PathwayInputs::load(&data_path("inputs.json")).unwrap();
    (config, inputs)
}

#[test]
fn test_sample_config_parses() {
    let (config, inputs) = sample();

    assert_eq!(config.horizon(), 2025..=2050);
    assert_eq!(config.constraints.len(), 4);
    assert_eq!(config.constraints[0], ConstraintSpec::EmissionsBudget);
    assert!(matches!(
        &config.constraints[2],
        ConstraintSpec::TechnologyMoratorium { classes, cutoff_year: 2035, .. }
            if classes == &vec![TechnologyClass::Initial]
    ));
    assert_eq!(config.lifetime_for(&Technology::from("BF-BOF"), Some(25)), 25);
    assert_eq!(config.lifetime_for(&Technology::from("Scrap EAF"), Some(30)), 30);

    assert_eq!(inputs.initial_assets.len(), 26);
    assert_eq!(inputs.technologies.len(), 6);
}

#[test]
fn test_sample_run_end_to_end() {
    let (config, inputs) = sample();
    let mut pathway = SimulationPathway::new(config, &inputs).unwrap();
    pathway.run().unwrap();
    pathway.check_referential_integrity().unwrap();

    assert!(pathway.is_completed());
    assert_eq!(pathway.outcomes().len(), 26);
    assert_eq!(pathway.snapshots().len(), 27);

    // No new or renewed initial-class capacity once the moratorium applies
    for t in pathway.registry().iter().filter(|t| t.year >= 2035) {
        if let Some(destination) = t.kind.destination() {
            assert_ne!(destination, &Technology::from("BF-BOF"), "{:?}", t);
            assert_ne!(destination, &Technology::from("Dry kiln coal"), "{:?}", t);
        }
    }

    // Hydrogen additions stay under the ramp-up cap while it applies
    for year in 2030..2036 {
        let cap = (2.0 * 1.5f64.powi((year - 2030) as i32)).round() as usize;
        let added = pathway
            .registry()
            .for_year(year)
            .filter(|t| match &t.kind {
                TransitionKind::Greenfield { destination, .. } => destination.as_str() == "DRI-EAF hydrogen",
                TransitionKind::Brownfield { origin, destination, .. } => {
                    destination.as_str() == "DRI-EAF hydrogen" && origin != destination
                }
                TransitionKind::Decommission { .. } => false,
            })
            .count();
        assert!(added <= cap, "{} hydrogen additions in {} (cap {})", added, year, cap);
    }

    let output = PathwayOutput::from_pathway(&pathway);
    assert_eq!(output.years.len(), 26);
    assert_eq!(output.transitions.len(), pathway.registry().len());
    let final_rows = output.stacks.iter().filter(|r| r.year == 2050).count();
    assert_eq!(final_rows, pathway.latest_snapshot().stack().len());
}

#[test]
fn test_sample_run_is_reproducible() {
    let (config, inputs) = sample();

    let mut first = SimulationPathway::new(config.clone(), &inputs).unwrap();
    first.run().unwrap();
    let mut second = SimulationPathway::new(config, &inputs).unwrap();
    second.run().unwrap();

    let a = PathwayOutput::from_pathway(&first).to_json().unwrap();
    let b = PathwayOutput::from_pathway(&second).to_json().unwrap();
    assert_eq!(a, b);
}
