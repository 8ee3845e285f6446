//! Shared domain types.
//!
//! These types are kept lightweight and serializable so they can be:
//!
//! - built once per run and passed by reference into the fitting engine
//! - read from / written to JSON run configurations and snapshots
//! - used as keys when several fitted candidates coexist for comparison

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{GrowthError, Result};

/// Regression structure of a fit.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    /// `size = intercept + slope * age`.
    Linear,
    /// `size = growth_curve(age; params)` with optional random intercepts.
    Nonlinear,
}

impl ModelType {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelType::Linear => "linear",
            ModelType::Nonlinear => "nonlinear",
        }
    }
}

/// Von Bertalanffy growth curve family.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum,
)]
pub enum GrowthCurve {
    #[serde(rename = "monophasic_vbgm")]
    #[value(name = "monophasic_vbgm")]
    Monophasic,
    #[serde(rename = "biphasic_vbgm")]
    #[value(name = "biphasic_vbgm")]
    Biphasic,
}

impl GrowthCurve {
    /// Curve parameters in evaluation order.
    pub fn parameter_names(self) -> &'static [&'static str] {
        match self {
            GrowthCurve::Monophasic => &["l_inf", "k", "t0"],
            GrowthCurve::Biphasic => &["l_inf", "k", "t0", "h", "t_h"],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GrowthCurve::Monophasic => "monophasic_vbgm",
            GrowthCurve::Biphasic => "biphasic_vbgm",
        }
    }

    /// Human-readable label for terminal output.
    pub fn display_name(self) -> &'static str {
        match self {
            GrowthCurve::Monophasic => "monophasic von Bertalanffy",
            GrowthCurve::Biphasic => "biphasic von Bertalanffy",
        }
    }
}

/// Where the biphasic transition term `A(t)` enters the curve.
///
/// Two formulas have been used historically:
///
/// - `DecayOutside`: `l_inf * A(t) * (1 - exp(-k (t - t0)))` (canonical)
/// - `DecayInside`:  `l_inf * A(t) * (1 - exp(-k A(t) (t - t0)))`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum BiphasicForm {
    #[default]
    DecayOutside,
    DecayInside,
}

/// Response distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Likelihood {
    /// Normal; zero-truncated for nonlinear models.
    Gaussian,
    /// Student-t with 3 degrees of freedom.
    StudentT,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorDistribution {
    Normal,
    TruncatedNormal,
}

/// Declarative prior for one scalar parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorDescriptor {
    pub distribution: PriorDistribution,
    pub mu: f64,
    pub sigma: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper: Option<f64>,
}

impl PriorDescriptor {
    pub fn normal(mu: f64, sigma: f64) -> Self {
        Self {
            distribution: PriorDistribution::Normal,
            mu,
            sigma,
            lower: None,
            upper: None,
        }
    }

    pub fn truncated(mu: f64, sigma: f64, lower: Option<f64>, upper: Option<f64>) -> Self {
        Self {
            distribution: PriorDistribution::TruncatedNormal,
            mu,
            sigma,
            lower,
            upper,
        }
    }

    /// Support of the prior as `(lower, upper)`; unbounded sides are infinite.
    pub fn bounds(&self) -> (f64, f64) {
        match self.distribution {
            PriorDistribution::Normal => (f64::NEG_INFINITY, f64::INFINITY),
            PriorDistribution::TruncatedNormal => (
                self.lower.unwrap_or(f64::NEG_INFINITY),
                self.upper.unwrap_or(f64::INFINITY),
            ),
        }
    }

    pub fn validate(&self, name: &str) -> Result<()> {
        if !(self.mu.is_finite() && self.sigma.is_finite() && self.sigma > 0.0) {
            return Err(GrowthError::config(format!(
                "prior for `{name}` needs finite mu and sigma > 0 (mu={}, sigma={})",
                self.mu, self.sigma
            )));
        }
        if self.distribution == PriorDistribution::Normal
            && (self.lower.is_some() || self.upper.is_some())
        {
            return Err(GrowthError::config(format!(
                "normal prior for `{name}` has bounds; use truncated_normal"
            )));
        }
        if self.distribution == PriorDistribution::TruncatedNormal {
            if self.lower.is_none() && self.upper.is_none() {
                return Err(GrowthError::config(format!(
                    "truncated_normal prior for `{name}` needs a lower or upper bound"
                )));
            }
            let (lo, hi) = self.bounds();
            if lo.is_nan() || hi.is_nan() || lo >= hi {
                return Err(GrowthError::config(format!(
                    "truncated_normal prior for `{name}` has an empty support [{lo}, {hi}]"
                )));
            }
        }
        Ok(())
    }
}

/// Parameter name -> prior.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriorSpec(BTreeMap<String, PriorDescriptor>);

impl PriorSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, prior: PriorDescriptor) -> Self {
        self.0.insert(name.into(), prior);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, prior: PriorDescriptor) {
        self.0.insert(name.into(), prior);
    }

    pub fn get(&self, name: &str) -> Option<&PriorDescriptor> {
        self.0.get(name)
    }

    /// Look up a prior the model cannot be built without.
    pub fn require(&self, name: &str) -> Result<&PriorDescriptor> {
        self.0.get(name).ok_or_else(|| {
            GrowthError::config(format!("missing prior for required parameter `{name}`"))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PriorDescriptor)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Parameter name -> grouping factors that receive a random intercept on it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactorSpec(BTreeMap<String, Vec<String>>);

impl FactorSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, parameter: impl Into<String>, factor: impl Into<String>) -> Self {
        self.insert(parameter, factor);
        self
    }

    pub fn insert(&mut self, parameter: impl Into<String>, factor: impl Into<String>) {
        let factors = self.0.entry(parameter.into()).or_default();
        let factor = factor.into();
        if !factors.contains(&factor) {
            factors.push(factor);
        }
    }

    pub fn factors_for(&self, parameter: &str) -> &[String] {
        self.0.get(parameter).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every distinct factor name referenced by any parameter.
    pub fn all_factors(&self) -> BTreeSet<String> {
        self.0.values().flatten().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }
}

/// Level assignment of every observation for one grouping factor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LevelIndex {
    /// Distinct level labels; `indices` point into this list.
    pub labels: Vec<String>,
    /// One level index per observation.
    pub indices: Vec<usize>,
}

impl LevelIndex {
    /// Index raw per-observation labels; levels are sorted for determinism.
    pub fn from_values<S: AsRef<str>>(values: &[S]) -> Self {
        let labels: Vec<String> = values
            .iter()
            .map(|v| v.as_ref().to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let indices = values
            .iter()
            .map(|v| labels.iter().position(|l| l == v.as_ref()).unwrap_or(0))
            .collect();
        Self { labels, indices }
    }

    pub fn n_levels(&self) -> usize {
        self.labels.len()
    }
}

/// Factor name -> per-observation level indices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FactorLevels(BTreeMap<String, LevelIndex>);

impl FactorLevels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, factor: impl Into<String>, index: LevelIndex) -> Self {
        self.insert(factor, index);
        self
    }

    pub fn insert(&mut self, factor: impl Into<String>, index: LevelIndex) {
        self.0.insert(factor.into(), index);
    }

    pub fn get(&self, factor: &str) -> Option<&LevelIndex> {
        self.0.get(factor)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &LevelIndex)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Complete declarative description of one fit.
///
/// Built once via [`ModelSpecBuilder`] (or deserialized and then
/// [`validate`](ModelSpec::validate)d) and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub model_type: ModelType,
    pub growth_curve: GrowthCurve,
    #[serde(default)]
    pub biphasic_form: BiphasicForm,
    pub likelihood: Likelihood,
    pub priors: PriorSpec,
    #[serde(default)]
    pub factors: FactorSpec,
    pub hdi_prob: f64,
}

impl ModelSpec {
    pub fn builder(model_type: ModelType) -> ModelSpecBuilder {
        ModelSpecBuilder::new(model_type)
    }

    /// Regression coefficients the model needs a prior for, in parameter order.
    pub fn required_parameters(&self) -> &'static [&'static str] {
        match self.model_type {
            ModelType::Linear => &["intercept", "slope"],
            ModelType::Nonlinear => self.growth_curve.parameter_names(),
        }
    }

    /// Structural checks that do not depend on data.
    ///
    /// Missing priors are reported by the model builder, which knows the
    /// parameters it is about to create.
    pub fn validate(&self) -> Result<()> {
        if !(self.hdi_prob > 0.0 && self.hdi_prob < 1.0) {
            return Err(GrowthError::config(format!(
                "hdi_prob must lie in (0, 1), got {}",
                self.hdi_prob
            )));
        }
        for (name, prior) in self.priors.iter() {
            prior.validate(name)?;
        }
        for (parameter, factors) in self.factors.iter() {
            if factors.is_empty() {
                continue;
            }
            if self.model_type == ModelType::Linear {
                return Err(GrowthError::config(format!(
                    "hierarchical factors on `{parameter}` need a nonlinear model"
                )));
            }
            if !self.required_parameters().contains(&parameter.as_str()) {
                return Err(GrowthError::config(format!(
                    "factor list references `{parameter}`, which is not a {} parameter",
                    self.growth_curve.as_str()
                )));
            }
        }
        Ok(())
    }
}

/// Step-by-step construction of a [`ModelSpec`].
#[derive(Debug, Clone)]
pub struct ModelSpecBuilder {
    model_type: ModelType,
    growth_curve: GrowthCurve,
    biphasic_form: BiphasicForm,
    likelihood: Likelihood,
    priors: PriorSpec,
    factors: FactorSpec,
    hdi_prob: f64,
}

impl ModelSpecBuilder {
    pub fn new(model_type: ModelType) -> Self {
        Self {
            model_type,
            growth_curve: GrowthCurve::Monophasic,
            biphasic_form: BiphasicForm::default(),
            likelihood: Likelihood::Gaussian,
            priors: PriorSpec::new(),
            factors: FactorSpec::new(),
            hdi_prob: 0.95,
        }
    }

    pub fn growth_curve(mut self, curve: GrowthCurve) -> Self {
        self.growth_curve = curve;
        self
    }

    pub fn biphasic_form(mut self, form: BiphasicForm) -> Self {
        self.biphasic_form = form;
        self
    }

    pub fn likelihood(mut self, likelihood: Likelihood) -> Self {
        self.likelihood = likelihood;
        self
    }

    pub fn prior(mut self, name: impl Into<String>, prior: PriorDescriptor) -> Self {
        self.priors.insert(name, prior);
        self
    }

    pub fn factor(mut self, parameter: impl Into<String>, factor: impl Into<String>) -> Self {
        self.factors.insert(parameter, factor);
        self
    }

    pub fn hdi_prob(mut self, prob: f64) -> Self {
        self.hdi_prob = prob;
        self
    }

    pub fn build(self) -> Result<ModelSpec> {
        let spec = ModelSpec {
            model_type: self.model_type,
            growth_curve: self.growth_curve,
            biphasic_form: self.biphasic_form,
            likelihood: self.likelihood,
            priors: self.priors,
            factors: self.factors,
            hdi_prob: self.hdi_prob,
        };
        spec.validate()?;
        Ok(spec)
    }
}

/// Recorded sex of a specimen.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    #[serde(alias = "f")]
    Female,
    #[serde(alias = "m")]
    Male,
}

impl Sex {
    /// Single-letter code used in the source datasets.
    pub fn code(self) -> &'static str {
        match self {
            Sex::Female => "f",
            Sex::Male => "m",
        }
    }
}

impl FromStr for Sex {
    type Err = GrowthError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "f" | "female" => Ok(Sex::Female),
            "m" | "male" => Ok(Sex::Male),
            other => Err(GrowthError::config(format!("unknown sex `{other}`"))),
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sex::Female => write!(f, "female"),
            Sex::Male => write!(f, "male"),
        }
    }
}

/// One measured specimen. Missing cells are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// Explanatory variable (age, years).
    pub age: Option<f64>,
    /// Response variable (length).
    pub size: Option<f64>,
    pub sex: Option<Sex>,
    pub location: Option<String>,
    pub year: Option<i32>,
}

/// Row-subset selection applied before fitting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataFilter {
    #[serde(default)]
    pub sex: Option<Sex>,
    /// Empty means "locations unavailable": no location filtering.
    #[serde(default)]
    pub locations: Vec<String>,
    /// Inclusive `(first, last)` year range; `None` means "years unavailable".
    #[serde(default)]
    pub years: Option<(i32, i32)>,
}

/// Dataset column names for each role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMap {
    pub explanatory: String,
    pub response: String,
    pub sex: String,
    pub location: String,
    pub year: String,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            explanatory: "age".to_string(),
            response: "fl".to_string(),
            sex: "sex".to_string(),
            location: "source".to_string(),
            year: "year".to_string(),
        }
    }
}

/// Taxonomic identity of the modelled population.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Taxonomy {
    #[serde(rename = "class")]
    pub class_: String,
    pub order: String,
    pub species: String,
}

impl Default for Taxonomy {
    fn default() -> Self {
        Self {
            class_: "chondrichthyes".to_string(),
            order: "carcharhiniformes".to_string(),
            species: "carcharhinus_limbatus".to_string(),
        }
    }
}

/// Identity of one fitted candidate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TraceKey {
    pub taxonomy: Taxonomy,
    pub sex: Option<Sex>,
    pub model_type: ModelType,
    pub growth_curve: GrowthCurve,
}

impl fmt::Display for TraceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sex = self.sex.map(Sex::code).unwrap_or("all");
        write!(
            f,
            "{}/{}/{}/{}/{}/{}",
            self.taxonomy.class_,
            self.taxonomy.order,
            self.taxonomy.species,
            sex,
            self.model_type.as_str(),
            self.growth_curve.as_str()
        )
    }
}

/// Sampler settings for one inference run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    pub chains: usize,
    /// Retained draws per chain.
    pub draws: usize,
    /// Warmup (burn-in) iterations per chain; used for adaptation and discarded.
    pub tune: usize,
    pub target_accept: f64,
    /// Run chains on `chains` worker threads instead of one.
    pub parallel: bool,
    pub seed: u64,
    pub max_treedepth: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            chains: 1,
            draws: 2000,
            tune: 1000,
            target_accept: 0.8,
            parallel: true,
            seed: 42,
            max_treedepth: 10,
        }
    }
}

impl SamplerConfig {
    pub fn cores_used(&self) -> usize {
        if self.parallel { self.chains.max(1) } else { 1 }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chains == 0 {
            return Err(GrowthError::config("chains must be >= 1"));
        }
        if self.draws == 0 {
            return Err(GrowthError::config("draws must be >= 1"));
        }
        if !(self.target_accept > 0.0 && self.target_accept < 1.0) {
            return Err(GrowthError::config(format!(
                "target_accept must lie in (0, 1), got {}",
                self.target_accept
            )));
        }
        if self.max_treedepth == 0 {
            return Err(GrowthError::config("max_treedepth must be >= 1"));
        }
        Ok(())
    }
}

/// Information criterion used to score candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum InformationCriterion {
    /// Pareto-smoothed importance-sampling leave-one-out.
    Loo,
    /// Widely applicable information criterion.
    Waic,
}

/// How relative model weights are derived from pointwise scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum WeightingMethod {
    Stacking,
    PseudoBma,
    /// Pseudo-BMA with Bayesian-bootstrap regularisation.
    PseudoBmaPlus,
}

/// Relational operator of an acceptance predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = "<")]
    Less,
    #[serde(rename = "==")]
    Equal,
}

impl Comparator {
    /// `Equal` uses a relative tolerance of `1e-9`.
    pub fn holds(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Comparator::Greater => lhs > rhs,
            Comparator::Less => lhs < rhs,
            Comparator::Equal => (lhs - rhs).abs() <= 1e-9 * rhs.abs().max(1.0),
        }
    }
}

impl FromStr for Comparator {
    type Err = GrowthError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            ">" | "greater than" | "above" => Ok(Comparator::Greater),
            "<" | "less than" | "below" => Ok(Comparator::Less),
            "==" | "=" | "equal to" => Ok(Comparator::Equal),
            other => Err(GrowthError::config(format!("unknown comparator `{other}`"))),
        }
    }
}

/// Column of a diagnostics summary table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Diagnostic {
    Mean,
    Sd,
    HdiLow,
    HdiHigh,
    Ess,
    RHat,
}

impl FromStr for Diagnostic {
    type Err = GrowthError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" => Ok(Diagnostic::Mean),
            "sd" => Ok(Diagnostic::Sd),
            "hdi_low" | "hdi_lower" => Ok(Diagnostic::HdiLow),
            "hdi_high" | "hdi_upper" => Ok(Diagnostic::HdiHigh),
            "ess" | "ess_bulk" => Ok(Diagnostic::Ess),
            "r_hat" | "rhat" => Ok(Diagnostic::RHat),
            other => Err(GrowthError::config(format!("unknown diagnostic `{other}`"))),
        }
    }
}

/// Free-text framing of an experiment, carried into run snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Experiment {
    pub statement: Option<String>,
    pub hypothesis: Option<String>,
    pub aim: Option<String>,
}

/// Documentation for one model parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDefinition {
    pub name: String,
    pub unit: String,
    pub description: String,
}

fn default_data_file() -> String {
    "data.csv".to_string()
}

/// Everything needed to reproduce one fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub taxonomy: Taxonomy,
    #[serde(default = "default_data_file")]
    pub data_file: String,
    #[serde(default)]
    pub columns: ColumnMap,
    #[serde(default)]
    pub filter: DataFilter,
    pub spec: ModelSpec,
    #[serde(default)]
    pub sampler: SamplerConfig,
    #[serde(default)]
    pub experiment: Experiment,
    #[serde(default)]
    pub parameters: Vec<ParameterDefinition>,
}

impl RunConfig {
    pub fn trace_key(&self) -> TraceKey {
        TraceKey {
            taxonomy: self.taxonomy.clone(),
            sex: self.filter.sex,
            model_type: self.spec.model_type,
            growth_curve: self.spec.growth_curve,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.spec.validate()?;
        self.sampler.validate()?;
        if let Some((first, last)) = self.filter.years {
            if first > last {
                return Err(GrowthError::config(format!(
                    "year range {first}..{last} is reversed"
                )));
            }
        }
        Ok(())
    }
}
