use std::fs;
use std::path::Path;

use shark_growth::app::pipeline::{compare_store, fit_dataset, run_fit};
use shark_growth::data::{Dataset, SimulationConfig, Truth, simulate};
use shark_growth::domain::{
    BiphasicForm, ColumnMap, Comparator, DataFilter, FactorLevels, GrowthCurve,
    InformationCriterion, ModelSpec, ModelType, PriorDescriptor, RunConfig, SamplerConfig, Sex,
    Taxonomy, TraceKey, WeightingMethod,
};
use shark_growth::fit::{
    Trace, TraceStore, build, compare, evaluate_estimate, evaluate_threshold, summarize,
};
use shark_growth::io::{IngestedData, load_dataset, write_dataset_csv};
use shark_growth::math::fit_line;

fn linear_spec() -> ModelSpec {
    ModelSpec::builder(ModelType::Linear)
        .prior("intercept", PriorDescriptor::normal(0.0, 10.0))
        .prior("slope", PriorDescriptor::normal(0.0, 10.0))
        .build()
        .unwrap()
}

fn sampler(chains: usize, draws: usize) -> SamplerConfig {
    SamplerConfig {
        chains,
        draws,
        tune: 500,
        seed: 42,
        ..SamplerConfig::default()
    }
}

fn run_config(spec: ModelSpec, filter: DataFilter, sampler: SamplerConfig) -> RunConfig {
    RunConfig {
        taxonomy: Taxonomy::default(),
        data_file: "data.csv".into(),
        columns: ColumnMap::default(),
        filter,
        spec,
        sampler,
        experiment: Default::default(),
        parameters: Vec::new(),
    }
}

fn ingested(dataset: Dataset) -> IngestedData {
    let n = dataset.len();
    IngestedData {
        dataset,
        row_errors: Vec::new(),
        rows_read: n,
        rows_used: n,
    }
}

fn fit_linear(dataset: &Dataset, sampler: SamplerConfig) -> Trace {
    let design = dataset.design(&Default::default()).unwrap();
    let graph = build(&linear_spec(), &design.x, &design.y, &FactorLevels::new()).unwrap();
    shark_growth::fit::run(&graph, &sampler).unwrap()
}

/// `2 + 3x` at 50 evenly spaced ages plus a ±1 residual pattern that is
/// orthogonal to the intercept and the age column, so least squares returns
/// the generating line exactly.
fn balanced_linear_data() -> Dataset {
    let exact = simulate(&SimulationConfig::linear(2.0, 3.0, 50, 0.0, 11)).unwrap();
    let observations = exact
        .observations()
        .iter()
        .enumerate()
        .map(|(i, o)| {
            let e = match (i >= 48, i % 4) {
                (true, _) => 0.0,
                (false, 0 | 3) => 1.0,
                (false, _) => -1.0,
            };
            let mut o = o.clone();
            o.size = o.size.map(|v| v + e);
            o
        })
        .collect();
    Dataset::new(observations)
}

#[test]
fn linear_fit_recovers_known_coefficients() {
    let data = balanced_linear_data();
    let design = data.design(&Default::default()).unwrap();
    let ols = fit_line(&design.x, &design.y).unwrap();
    assert!((ols.intercept - 2.0).abs() < 1e-9);
    assert!((ols.slope - 3.0).abs() < 1e-9);

    let trace = fit_linear(&data, sampler(2, 500));
    assert_eq!(trace.n_chains(), 2);
    assert_eq!(trace.n_draws(), 500);

    let table = summarize(&trace, 0.95).unwrap();
    assert!(evaluate_estimate(&table, "slope", 3.0, 0.1).unwrap());
    assert!(evaluate_estimate(&table, "intercept", 2.0, 0.15).unwrap());
    assert!(evaluate_threshold(&table, "r_hat", Comparator::Less, 1.05).unwrap());
    assert!(evaluate_threshold(&table, "ess", Comparator::Greater, 100.0).unwrap());

    // With weak priors the posterior mean sits on the least-squares line.
    let intercept = table.get("intercept").unwrap().mean;
    let slope = table.get("slope").unwrap().mean;
    assert!((intercept - ols.intercept).abs() < 0.08, "intercept {intercept}");
    assert!((slope - ols.slope).abs() < 0.015, "slope {slope}");

    let sigma = table.get("sigma").unwrap();
    assert!(sigma.hdi_low < 1.0 && sigma.hdi_high > 1.0);
}

#[test]
fn parallel_and_sequential_chains_match() {
    let data = simulate(&SimulationConfig::linear(2.0, 3.0, 30, 1.0, 5)).unwrap();
    let parallel = fit_linear(&data, sampler(3, 100));
    let sequential = fit_linear(
        &data,
        SamplerConfig {
            parallel: false,
            ..sampler(3, 100)
        },
    );
    assert_eq!(parallel.chains(), sequential.chains());
}

#[test]
fn location_filter_fits_the_selected_subset() {
    let config = SimulationConfig {
        locations: vec!["nsw1".into(), "qld".into()],
        location_effects: vec![0.0, 20.0],
        first_year: Some(2000),
        ..SimulationConfig::linear(2.0, 3.0, 40, 1.0, 9)
    };
    let data = simulate(&config).unwrap();
    let filter = DataFilter {
        locations: vec!["qld".into()],
        ..DataFilter::default()
    };
    let out = fit_dataset(
        &run_config(linear_spec(), filter, sampler(1, 300)),
        ingested(data),
    )
    .unwrap();

    assert_eq!(out.dataset.len(), 20);
    assert_eq!(out.trace.n_observations(), 20);
    assert_eq!(out.residuals.len(), 20);
    assert_eq!(out.bands.len(), 20);
    assert!(out.bands.iter().all(|b| b.hdi_low < b.mean && b.mean < b.hdi_high));
    // The qld shift moves the intercept, not the slope.
    assert!(evaluate_estimate(&out.summary, "intercept", 22.0, 0.1).unwrap());
    assert!(evaluate_estimate(&out.summary, "slope", 3.0, 0.1).unwrap());
}

#[test]
fn empty_filter_result_is_a_data_error() {
    let data = simulate(&SimulationConfig::linear(2.0, 3.0, 10, 1.0, 1)).unwrap();
    let filter = DataFilter {
        sex: Some(Sex::Male),
        years: Some((1990, 1995)),
        ..DataFilter::default()
    };
    let err = fit_dataset(
        &run_config(linear_spec(), filter, sampler(1, 10)),
        ingested(data),
    )
    .unwrap_err();
    assert_eq!(err.exit_code(), 3);
}

#[test]
fn monophasic_growth_curve_is_recovered() {
    let config = SimulationConfig {
        truth: Truth::Growth {
            curve: GrowthCurve::Monophasic,
            form: BiphasicForm::default(),
            params: vec![200.0, 0.3, -1.0],
        },
        age_min: 0.0,
        age_max: 15.0,
        noise_sd: 5.0,
        ..SimulationConfig::linear(0.0, 0.0, 60, 5.0, 3)
    };
    let data = simulate(&config).unwrap();
    let spec = ModelSpec::builder(ModelType::Nonlinear)
        .growth_curve(GrowthCurve::Monophasic)
        .prior("l_inf", PriorDescriptor::truncated(200.0, 50.0, Some(0.0), None))
        .prior("k", PriorDescriptor::truncated(0.3, 0.2, Some(0.0), None))
        .prior("t0", PriorDescriptor::normal(-1.0, 1.0))
        .build()
        .unwrap();
    let out = fit_dataset(
        &run_config(spec, DataFilter::default(), sampler(2, 300)),
        ingested(data),
    )
    .unwrap();
    assert!(evaluate_estimate(&out.summary, "l_inf", 200.0, 0.1).unwrap());
    assert!(evaluate_estimate(&out.summary, "k", 0.3, 0.3).unwrap());
}

#[test]
fn identical_fits_share_weight_and_mismatched_sizes_are_rejected() {
    let data = simulate(&SimulationConfig::linear(2.0, 3.0, 30, 1.0, 21)).unwrap();
    let trace = fit_linear(&data, sampler(1, 200));

    let key = |sex| TraceKey {
        taxonomy: Taxonomy::default(),
        sex,
        model_type: ModelType::Linear,
        growth_curve: GrowthCurve::Monophasic,
    };
    let mut store = TraceStore::new();
    store.insert(key(None), trace.clone()).unwrap();
    store.insert(key(Some(Sex::Female)), trace.clone()).unwrap();
    assert!(store.insert(key(None), trace.clone()).is_err());

    for method in [WeightingMethod::Stacking, WeightingMethod::PseudoBma] {
        let result = compare_store(&store, InformationCriterion::Loo, method).unwrap();
        for row in &result.rows {
            assert!((row.weight - 0.5).abs() < 1e-6, "{method:?}: {}", row.weight);
            assert!(row.elpd_diff.abs() < 1e-9);
        }
    }

    let smaller = simulate(&SimulationConfig::linear(2.0, 3.0, 20, 1.0, 21)).unwrap();
    let other = fit_linear(&smaller, sampler(1, 50));
    let err = compare(
        &[("a".to_string(), &trace), ("b".to_string(), &other)],
        InformationCriterion::Waic,
        WeightingMethod::Stacking,
    )
    .unwrap_err();
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn threshold_fails_when_any_row_fails() {
    let data = simulate(&SimulationConfig::linear(2.0, 3.0, 30, 1.0, 4)).unwrap();
    let table = summarize(&fit_linear(&data, sampler(1, 100)), 0.9).unwrap();
    // Every parameter has a mean above -1e6; not every mean is above 2.5.
    assert!(evaluate_threshold(&table, "mean", Comparator::Greater, -1e6).unwrap());
    assert!(!evaluate_threshold(&table, "mean", Comparator::Greater, 2.5).unwrap());
}

fn write_species_csv(root: &Path, dataset: &Dataset) {
    let t = Taxonomy::default();
    let dir = root.join(&t.class_).join(&t.order).join(&t.species);
    fs::create_dir_all(&dir).unwrap();
    write_dataset_csv(&dir.join("data.csv"), dataset).unwrap();
}

#[test]
fn csv_round_trip_through_the_data_directory() {
    let root = tempfile::tempdir().unwrap();
    let config = SimulationConfig {
        locations: vec!["nsw1".into(), "nsw2".into()],
        first_year: Some(2005),
        ..SimulationConfig::linear(2.0, 3.0, 24, 1.0, 13)
    };
    let data = simulate(&config).unwrap();
    write_species_csv(root.path(), &data);

    let t = Taxonomy::default();
    let path = root
        .path()
        .join(&t.class_)
        .join(&t.order)
        .join(&t.species)
        .join("data.csv");
    let loaded = load_dataset(&path, &ColumnMap::default()).unwrap();
    assert_eq!(loaded.rows_used, 24);
    assert!(loaded.row_errors.is_empty());
    let first = &loaded.dataset.observations()[1];
    assert_eq!(first.sex, Some(Sex::Male));
    assert_eq!(first.location.as_deref(), Some("nsw2"));
    assert_eq!(first.year, Some(2005));

    let filter = DataFilter {
        sex: Some(Sex::Female),
        ..DataFilter::default()
    };
    let out = run_fit(
        &run_config(linear_spec(), filter, sampler(1, 100)),
        root.path(),
    )
    .unwrap();
    assert_eq!(out.design.x.len(), 12);
    assert_eq!(out.ingest.rows_read, 24);
}
