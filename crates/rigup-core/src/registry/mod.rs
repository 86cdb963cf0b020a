//! Step catalog and per-run registry selection.
//!
//! The [`StepCatalog`] owns every declared [`StepDefinition`]. A
//! [`StepRegistry`] borrows the subset that applies to one run, in the order
//! it must execute.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use crate::config::{PlanFile, RunConfiguration};
use crate::detect::Environment;
use crate::step::StepDefinition;
use crate::step::actions::build_step;
use crate::types::{Category, Mode};

/// All steps known to the orchestrator, in declaration order.
#[derive(Debug, Default)]
pub struct StepCatalog {
    steps: Vec<StepDefinition>,
}

impl StepCatalog {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Build a catalog from a validated plan.
    pub fn from_plan(plan: &PlanFile) -> anyhow::Result<Self> {
        let mut catalog = Self::new();
        for spec in &plan.steps {
            let step = build_step(spec)
                .map_err(|e| e.context(format!("Invalid step: '{}'", spec.name)))?;
            catalog.register(step)?;
        }
        Ok(catalog)
    }

    /// Add a step. Names are unique within a catalog.
    pub fn register(&mut self, step: StepDefinition) -> anyhow::Result<()> {
        if self.get(step.name()).is_some() {
            anyhow::bail!("Duplicate step name: '{}'", step.name());
        }
        self.steps.push(step);
        Ok(())
    }

    pub fn all(&self) -> &[StepDefinition] {
        &self.steps
    }

    pub fn get(&self, name: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.name() == name)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Why a catalog step was left out of a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Exclusion {
    UnsupportedOs,
    OtherStrategy,
    NoAccelerator,
    SkippedCategory,
    SkippedStep,
}

impl Exclusion {
    pub fn as_str(self) -> &'static str {
        match self {
            Exclusion::UnsupportedOs => "not for this OS",
            Exclusion::OtherStrategy => "other strategy",
            Exclusion::NoAccelerator => "needs a discrete accelerator",
            Exclusion::SkippedCategory => "category skipped",
            Exclusion::SkippedStep => "step skipped",
        }
    }
}

impl fmt::Display for Exclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered steps selected for one run.
///
/// In revert mode `steps` holds only revertible steps in reverse apply order;
/// steps without a revert action are listed in `irreversible` instead.
#[derive(Debug)]
pub struct StepRegistry<'a> {
    mode: Mode,
    steps: Vec<&'a StepDefinition>,
    irreversible: Vec<&'a StepDefinition>,
    excluded: Vec<(&'a StepDefinition, Exclusion)>,
}

impl<'a> StepRegistry<'a> {
    /// A registry over explicit steps, executed in the given order.
    pub fn from_steps(mode: Mode, steps: impl IntoIterator<Item = &'a StepDefinition>) -> Self {
        Self {
            mode,
            steps: steps.into_iter().collect(),
            irreversible: Vec::new(),
            excluded: Vec::new(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn steps(&self) -> &[&'a StepDefinition] {
        &self.steps
    }

    /// Selected steps with no revert action (revert mode only).
    pub fn irreversible(&self) -> &[&'a StepDefinition] {
        &self.irreversible
    }

    pub fn excluded(&self) -> &[(&'a StepDefinition, Exclusion)] {
        &self.excluded
    }

    pub fn names(&self) -> Vec<&'a str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty() && self.irreversible.is_empty()
    }
}

/// Select and order the steps for `env` and `cfg`.
///
/// Apply order is category priority (power, service, package, environment
/// variable, filesystem), then the step's own priority, then declaration
/// order. Revert order is the exact reverse of apply order. The same inputs
/// always give the same sequence.
pub fn build_registry<'a>(
    catalog: &'a StepCatalog,
    env: &Environment,
    cfg: &RunConfiguration,
) -> StepRegistry<'a> {
    let mut selected = Vec::new();
    let mut excluded = Vec::new();

    for step in catalog.all() {
        match exclusion_for(step, env, cfg) {
            Some(reason) => excluded.push((step, reason)),
            None => selected.push(step),
        }
    }

    // stable: ties keep declaration order
    selected.sort_by_key(|s| (s.category().priority(), s.priority()));

    let mode = cfg.mode();
    let (steps, irreversible): (Vec<&StepDefinition>, Vec<&StepDefinition>) = match mode {
        Mode::Apply => (selected, Vec::new()),
        Mode::Revert => {
            selected.reverse();
            selected.into_iter().partition(|s| s.is_revertible())
        }
    };

    tracing::debug!(
        %mode,
        selected = steps.len(),
        irreversible = irreversible.len(),
        excluded = excluded.len(),
        "Built step registry"
    );

    StepRegistry {
        mode,
        steps,
        irreversible,
        excluded,
    }
}

fn exclusion_for(step: &StepDefinition, env: &Environment, cfg: &RunConfiguration) -> Option<Exclusion> {
    if !step.supports_os(env.os()) {
        return Some(Exclusion::UnsupportedOs);
    }
    if cfg.skips_step(step.name()) {
        return Some(Exclusion::SkippedStep);
    }
    if cfg.skips_category(step.category()) {
        return Some(Exclusion::SkippedCategory);
    }
    if !step.supports_strategy(cfg.strategy()) {
        return Some(Exclusion::OtherStrategy);
    }
    if step.requires_accelerator() && !env.accelerator().is_discrete() {
        return Some(Exclusion::NoAccelerator);
    }
    None
}

/// Categories present in a registry, in execution order.
pub fn categories(registry: &StepRegistry<'_>) -> Vec<Category> {
    let mut seen = HashSet::new();
    registry
        .steps()
        .iter()
        .map(|s| s.category())
        .filter(|c| seen.insert(*c))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{Accelerator, GpuVendor};
    use crate::step::{Action, ActionContext, ActionOutput, FnAction};
    use crate::types::OsFamily;

    fn noop() -> Box<dyn Action> {
        Box::new(FnAction::new("noop", |_: &ActionContext<'_>| Ok(ActionOutput::changed("ok"))))
    }

    fn step(name: &str, category: Category) -> StepDefinition {
        StepDefinition::new(name, category, noop())
    }

    fn reversible(name: &str, category: Category) -> StepDefinition {
        step(name, category).with_revert(noop())
    }

    fn linux() -> Environment {
        Environment::new(OsFamily::Linux, "x86_64", Accelerator::None, false)
    }

    fn cfg(mode: Mode) -> RunConfiguration {
        RunConfiguration::new(mode, "/tmp/artifacts", "/tmp/transcript.log")
    }

    fn catalog(steps: Vec<StepDefinition>) -> StepCatalog {
        let mut catalog = StepCatalog::new();
        for s in steps {
            catalog.register(s).unwrap();
        }
        catalog
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut catalog = StepCatalog::new();
        catalog.register(step("a", Category::Power)).unwrap();
        assert!(catalog.register(step("a", Category::Package)).is_err());
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn apply_order_follows_category_then_priority() {
        let catalog = catalog(vec![
            step("cleanup", Category::Filesystem),
            step("env", Category::EnvironmentVariable),
            step("torch", Category::Package).with_priority(10),
            step("venv", Category::Package),
            step("service", Category::Service),
            step("power", Category::Power),
        ]);

        let registry = build_registry(&catalog, &linux(), &cfg(Mode::Apply));
        assert_eq!(
            registry.names(),
            vec!["power", "service", "venv", "torch", "env", "cleanup"]
        );
        assert_eq!(
            categories(&registry),
            vec![
                Category::Power,
                Category::Service,
                Category::Package,
                Category::EnvironmentVariable,
                Category::Filesystem
            ]
        );
    }

    #[test]
    fn ties_keep_declaration_order() {
        let catalog = catalog(vec![
            step("b", Category::Package),
            step("a", Category::Package),
            step("c", Category::Package),
        ]);
        let registry = build_registry(&catalog, &linux(), &cfg(Mode::Apply));
        assert_eq!(registry.names(), vec!["b", "a", "c"]);
    }

    #[test]
    fn identical_inputs_give_identical_order() {
        let catalog = catalog(vec![
            step("x", Category::Filesystem),
            step("y", Category::Power),
            step("z", Category::Package),
        ]);
        let first = build_registry(&catalog, &linux(), &cfg(Mode::Apply)).names();
        let second = build_registry(&catalog, &linux(), &cfg(Mode::Apply)).names();
        assert_eq!(first, second);
    }

    #[test]
    fn platform_and_skips_filter() {
        let catalog = catalog(vec![
            step("linux-only", Category::Power).with_platforms([OsFamily::Linux]),
            step("mac-only", Category::Power).with_platforms([OsFamily::MacOs]),
            step("anywhere", Category::Package),
            step("skipped-by-name", Category::Package),
            step("env", Category::EnvironmentVariable),
        ]);
        let cfg = cfg(Mode::Apply)
            .with_skip([Category::EnvironmentVariable])
            .with_skip_steps(["skipped-by-name"]);

        let registry = build_registry(&catalog, &linux(), &cfg);
        assert_eq!(registry.names(), vec!["linux-only", "anywhere"]);

        let reasons: Vec<_> = registry
            .excluded()
            .iter()
            .map(|(s, r)| (s.name(), *r))
            .collect();
        assert!(reasons.contains(&("mac-only", Exclusion::UnsupportedOs)));
        assert!(reasons.contains(&("skipped-by-name", Exclusion::SkippedStep)));
        assert!(reasons.contains(&("env", Exclusion::SkippedCategory)));
    }

    #[test]
    fn strategy_and_accelerator_filter() {
        let catalog = catalog(vec![
            step("pip-torch", Category::Package).with_strategies(["pip"]),
            step("conda-torch", Category::Package).with_strategies(["conda"]),
            step("cuda", Category::Service).with_requires_accelerator(true),
        ]);

        let registry = build_registry(&catalog, &linux(), &cfg(Mode::Apply).with_strategy("conda"));
        assert_eq!(registry.names(), vec!["conda-torch"]);

        let gpu = Environment::new(
            OsFamily::Linux,
            "x86_64",
            Accelerator::Discrete(GpuVendor::Nvidia),
            false,
        );
        let registry = build_registry(&catalog, &gpu, &cfg(Mode::Apply));
        assert_eq!(registry.names(), vec!["cuda", "pip-torch"]);
    }

    #[test]
    fn revert_is_exact_reverse_of_apply() {
        let catalog = catalog(vec![
            reversible("a", Category::Power),
            reversible("b", Category::Package),
            reversible("c", Category::Filesystem),
        ]);

        let apply = build_registry(&catalog, &linux(), &cfg(Mode::Apply));
        let revert = build_registry(&catalog, &linux(), &cfg(Mode::Revert));

        assert_eq!(apply.names(), vec!["a", "b", "c"]);
        assert_eq!(revert.names(), vec!["c", "b", "a"]);
        assert_eq!(revert.mode(), Mode::Revert);
    }

    #[test]
    fn revert_sets_aside_irreversible_steps() {
        let catalog = catalog(vec![
            reversible("a", Category::Power),
            step("cleanup", Category::Filesystem),
            reversible("b", Category::Package),
        ]);

        let revert = build_registry(&catalog, &linux(), &cfg(Mode::Revert));
        assert_eq!(revert.names(), vec!["b", "a"]);
        let irreversible: Vec<_> = revert.irreversible().iter().map(|s| s.name()).collect();
        assert_eq!(irreversible, vec!["cleanup"]);
    }

    #[test]
    fn unknown_os_selects_nothing() {
        let catalog = catalog(vec![step("a", Category::Power), reversible("b", Category::Package)]);

        let apply = build_registry(&catalog, &Environment::unknown(), &cfg(Mode::Apply));
        assert!(apply.is_empty());
        let revert = build_registry(&catalog, &Environment::unknown(), &cfg(Mode::Revert));
        assert!(revert.is_empty());
    }

    #[test]
    fn catalog_from_builtin_plan() {
        let loaded = crate::config::PlanStore::builtin().unwrap();
        let catalog = StepCatalog::from_plan(&loaded.plan).unwrap();
        assert_eq!(catalog.len(), loaded.plan.steps.len());
        assert!(catalog.get("tokenizers-parallelism").unwrap().is_revertible());
        assert!(!catalog.get("pip-cache-purge").unwrap().is_revertible());
    }
}
