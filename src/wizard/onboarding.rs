//! Product onboarding flow
//!
//! Source -> Auth -> Preview -> Config -> Success. Auth carries an
//! on-demand connect action and no validator, so it can be skipped.

use serde_json::{Value, json};

use super::registry::StepRegistry;
use super::step::{ActionTrigger, Step};
use super::WizardData;

pub const SOURCE: &str = "source";
pub const AUTH: &str = "auth";
pub const PREVIEW: &str = "preview";
pub const CONFIG: &str = "config";
pub const SUCCESS: &str = "success";

pub const SOURCES_KEY: &str = "sources";
pub const TEMPLATE_KEY: &str = "template";
pub const PRIORITY_KEY: &str = "priority";

/// Billing and CRM sources a user may connect: (id, label)
pub const SOURCES: &[(&str, &str)] = &[
    ("stripe", "Stripe"),
    ("chargebee", "Chargebee"),
    ("paddle", "Paddle"),
    ("recurly", "Recurly"),
    ("hubspot", "HubSpot"),
    ("salesforce", "Salesforce"),
];

/// Dashboard templates: (id, label, description)
pub const TEMPLATES: &[(&str, &str, &str)] = &[
    (
        "comprehensive",
        "Comprehensive",
        "Every revenue, churn and expansion metric",
    ),
    ("executive", "Executive", "Headline MRR, ARR and growth only"),
    ("growth", "Growth", "Acquisition, activation and expansion"),
];

/// Account prioritisation strategies: (id, label, description)
pub const PRIORITIES: &[(&str, &str, &str)] = &[
    ("mrr-based", "MRR based", "Largest accounts first"),
    ("churn-risk", "Churn risk", "Accounts most likely to cancel first"),
    ("expansion", "Expansion", "Accounts most likely to upgrade first"),
];

pub const DEFAULT_TEMPLATE: &str = "comprehensive";
pub const DEFAULT_PRIORITY: &str = "mrr-based";

/// The onboarding steps with their validators and seeded defaults.
pub fn registry() -> StepRegistry {
    let steps = vec![
        Step::new(SOURCE, "Choose your data sources")
            .with_subtitle("Select at least one billing or CRM source")
            .with_validator(has_source),
        Step::new(AUTH, "Connect your accounts")
            .with_subtitle("Sign in to each source, or skip and connect later")
            .with_action(ActionTrigger::OnDemand),
        Step::new(PREVIEW, "Preview your dashboard")
            .with_subtitle("A sample of what your metrics will look like"),
        Step::new(CONFIG, "Configure your dashboard")
            .with_subtitle("Pick a template and how accounts are prioritised"),
        Step::new(SUCCESS, "You're all set")
            .with_subtitle("Your dashboard is being prepared"),
    ];

    let mut defaults = WizardData::new();
    defaults.insert(TEMPLATE_KEY.into(), json!(DEFAULT_TEMPLATE));
    defaults.insert(PRIORITY_KEY.into(), json!(DEFAULT_PRIORITY));

    // Five fixed steps: never empty
    StepRegistry::new(steps)
        .map(|registry| registry.with_defaults(defaults))
        .unwrap_or_else(|_| unreachable!("onboarding registry has steps"))
}

/// Display label for a source id, falling back to the id itself.
pub fn source_label(id: &str) -> &str {
    SOURCES
        .iter()
        .find(|(source, _)| *source == id)
        .map(|(_, label)| *label)
        .unwrap_or(id)
}

fn has_source(data: &WizardData) -> bool {
    data.get(SOURCES_KEY)
        .and_then(Value::as_array)
        .is_some_and(|sources| !sources.is_empty())
}
