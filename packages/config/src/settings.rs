//! The string-keyed settings surface and the engine configuration.
//!
//! Every setting has two spellings, a canonical snake_case name and a
//! camelCase one, kept in two parallel sorted tables; either spelling
//! resolves to the same setting. Legacy names resolve through the alias
//! table first. Values are strings and go through per-type parsers
//! (yes/no booleans, duration suffixes, case-insensitive enum tokens).
//!
//! [`EngineBuilder::build`] resolves the object wrapper through the
//! process-wide singleton registry, so engines built with identical wrapper
//! settings share one wrapper instance.

use std::sync::Arc;

use formwork_model::{DateKind, ModelError, Value};
use formwork_wrap::{Host, ObjectWrapper, ObjectWrapperBuilder, UnknownTypePolicy};
use serde::Serialize;
use tracing::debug;

use crate::singletons::{global, ArgValue, Frozen, HoldStrength, SingletonError, SingletonSpec};
use crate::version::Version;

/// Canonical snake_case setting names, sorted.
const SETTING_NAMES_SNAKE: [&str; 6] = [
    "default_date_type",
    "force_legacy_non_list_collections",
    "object_wrapper",
    "template_update_delay",
    "unknown_type_policy",
    "use_adapters_for_containers",
];

/// The camelCase spellings, sorted, index-parallel to the snake table.
const SETTING_NAMES_CAMEL: [&str; 6] = [
    "defaultDateType",
    "forceLegacyNonListCollections",
    "objectWrapper",
    "templateUpdateDelay",
    "unknownTypePolicy",
    "useAdaptersForContainers",
];

/// Legacy spellings and the canonical name they resolve to.
const ALIASES: [(&str, &str); 4] = [
    ("template_update_interval", "template_update_delay"),
    ("templateUpdateInterval", "template_update_delay"),
    ("use_adapters", "use_adapters_for_containers"),
    ("useAdapters", "use_adapters_for_containers"),
];

/// Settings application failures.
#[derive(thiserror::Error, Debug)]
pub enum SettingError {
    /// The name matches no setting, no alias, and no fallthrough handler.
    #[error("unknown setting name {name:?}")]
    UnknownName {
        /// The unresolved name as given.
        name: String,
    },

    /// The value does not parse for the named setting.
    #[error("invalid value {value:?} for setting {name:?}: {reason}")]
    BadValue {
        /// The canonical setting name.
        name: String,
        /// The rejected value.
        value: String,
        /// What the parser expected.
        reason: String,
    },

    /// Resolving a shared configuration object failed.
    #[error(transparent)]
    Singleton(#[from] SingletonError),
}

/// Resolve a setting name (either convention, aliases included) to its
/// canonical snake_case form.
fn canonical_name(name: &str) -> Option<&'static str> {
    let name = ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(name);
    if let Ok(i) = SETTING_NAMES_SNAKE.binary_search(&name) {
        return Some(SETTING_NAMES_SNAKE[i]);
    }
    if let Ok(i) = SETTING_NAMES_CAMEL.binary_search(&name) {
        return Some(SETTING_NAMES_SNAKE[i]);
    }
    None
}

fn parse_bool(name: &str, value: &str) -> Result<bool, SettingError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "t" => Ok(true),
        "false" | "no" | "n" | "f" => Ok(false),
        _ => Err(SettingError::BadValue {
            name: name.to_string(),
            value: value.to_string(),
            reason: "expected a boolean (true/false/yes/no/y/n/t/f)".to_string(),
        }),
    }
}

/// Parse a duration into milliseconds. A bare integer is read as seconds
/// (the legacy form); otherwise `ms`, `s`, `m`, and `h` suffixes apply.
fn parse_duration_ms(name: &str, value: &str) -> Result<u64, SettingError> {
    let reject = |reason: &str| SettingError::BadValue {
        name: name.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    };
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return seconds
            .checked_mul(1000)
            .ok_or_else(|| reject("duration exceeds the representable range"));
    }
    let (digits, factor) = if let Some(d) = value.strip_suffix("ms") {
        (d, 1)
    } else if let Some(d) = value.strip_suffix('s') {
        (d, 1000)
    } else if let Some(d) = value.strip_suffix('m') {
        (d, 60 * 1000)
    } else if let Some(d) = value.strip_suffix('h') {
        (d, 60 * 60 * 1000)
    } else {
        return Err(reject("expected an integer with optional ms/s/m/h suffix"));
    };
    let amount: u64 = digits
        .trim()
        .parse()
        .map_err(|_| reject("expected an integer with optional ms/s/m/h suffix"))?;
    amount
        .checked_mul(factor)
        .ok_or_else(|| reject("duration exceeds the representable range"))
}

fn parse_date_kind(name: &str, value: &str) -> Result<DateKind, SettingError> {
    match value.to_ascii_lowercase().as_str() {
        "date" => Ok(DateKind::Date),
        "time" => Ok(DateKind::Time),
        "datetime" => Ok(DateKind::DateTime),
        "unknown" => Ok(DateKind::Unknown),
        _ => Err(SettingError::BadValue {
            name: name.to_string(),
            value: value.to_string(),
            reason: "expected date, time, datetime, or unknown".to_string(),
        }),
    }
}

fn parse_unknown_type_policy(name: &str, value: &str) -> Result<UnknownTypePolicy, SettingError> {
    match value.to_ascii_lowercase().as_str() {
        "generic" => Ok(UnknownTypePolicy::Generic),
        "refuse" => Ok(UnknownTypePolicy::Refuse),
        _ => Err(SettingError::BadValue {
            name: name.to_string(),
            value: value.to_string(),
            reason: "expected generic or refuse".to_string(),
        }),
    }
}

/// Which wrapper preset the `object_wrapper` setting selects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WrapperChoice {
    /// The standard wrapper, as the policy flags configure it.
    Default,
    /// The legacy wrapper: every container an eager copy.
    Legacy,
    /// The restrictive wrapper: unknown host types are refused.
    Restrictive,
}

fn parse_wrapper_choice(name: &str, value: &str) -> Result<WrapperChoice, SettingError> {
    match value.to_ascii_lowercase().as_str() {
        "default" => Ok(WrapperChoice::Default),
        "legacy" => Ok(WrapperChoice::Legacy),
        "restrictive" => Ok(WrapperChoice::Restrictive),
        _ => Err(SettingError::BadValue {
            name: name.to_string(),
            value: value.to_string(),
            reason: "expected default, legacy, or restrictive".to_string(),
        }),
    }
}

/// The version whose wrapper behavior the current codebase implements.
pub const CURRENT_VERSION: Version = Version::new(1, 2, 0);

impl Frozen for ObjectWrapper {}

fn bool_token(v: bool) -> ArgValue {
    ArgValue::Bool(v)
}

fn str_token(v: impl ToString) -> ArgValue {
    ArgValue::Str(v.to_string())
}

/// Singleton spec for the shared object wrapper.
struct WrapperSpec;

impl SingletonSpec for WrapperSpec {
    type Product = ObjectWrapper;

    const NAME: &'static str = "object_wrapper";

    fn normalize_version(version: Version) -> Version {
        // Wrapper behavior changed at 1.2.0 (adapters by default); earlier
        // versions all behave like 1.0.0.
        if version >= Version::new(1, 2, 0) {
            Version::new(1, 2, 0)
        } else {
            Version::new(1, 0, 0)
        }
    }

    fn property_defaults() -> Vec<(&'static str, ArgValue)> {
        vec![
            ("default_date_type", str_token(DateKind::Unknown)),
            ("force_legacy_non_list_collections", bool_token(false)),
            ("unknown_type_policy", str_token("generic")),
            ("use_adapters_for_containers", bool_token(true)),
        ]
    }

    fn construct(
        _args: &[ArgValue],
        props: &[(String, ArgValue)],
    ) -> Result<ObjectWrapper, SingletonError> {
        let mut builder = ObjectWrapperBuilder::new();
        for (name, value) in props {
            builder = match (name.as_str(), value) {
                ("use_adapters_for_containers", ArgValue::Bool(v)) => builder.use_adapters(*v),
                ("force_legacy_non_list_collections", ArgValue::Bool(v)) => {
                    builder.force_legacy_non_list_collections(*v)
                }
                ("default_date_type", ArgValue::Str(token)) => builder.default_date_kind(
                    parse_date_kind("default_date_type", token).map_err(|e| {
                        SingletonError::BadArgs {
                            spec: Self::NAME,
                            reason: e.to_string(),
                        }
                    })?,
                ),
                ("unknown_type_policy", ArgValue::Str(token)) => builder.unknown_type_policy(
                    parse_unknown_type_policy("unknown_type_policy", token).map_err(|e| {
                        SingletonError::BadArgs {
                            spec: Self::NAME,
                            reason: e.to_string(),
                        }
                    })?,
                ),
                _ => {
                    return Err(SingletonError::BadArgs {
                        spec: Self::NAME,
                        reason: format!("property {:?} has the wrong type", name),
                    })
                }
            };
        }
        Ok(builder.build())
    }

    fn get_property(product: &ObjectWrapper, name: &str) -> Option<ArgValue> {
        match name {
            "use_adapters_for_containers" => Some(bool_token(product.uses_adapters())),
            "force_legacy_non_list_collections" => {
                Some(bool_token(product.forces_legacy_non_list_collections()))
            }
            "default_date_type" => Some(str_token(product.default_date_kind())),
            "unknown_type_policy" => Some(str_token(match product.unknown_type_policy() {
                UnknownTypePolicy::Generic => "generic",
                UnknownTypePolicy::Refuse => "refuse",
            })),
            _ => None,
        }
    }
}

/// The effective settings of a built engine.
#[derive(Clone, Debug, Serialize)]
pub struct SettingsSnapshot {
    /// Template re-check interval, in milliseconds.
    pub template_update_delay_ms: u64,
    /// Whether containers wrap as live adapters.
    pub use_adapters_for_containers: bool,
    /// Whether non-list collections are forced to eager copies.
    pub force_legacy_non_list_collections: bool,
    /// Date flavor assigned to generic instants.
    pub default_date_type: DateKind,
    /// Policy for unclaimed host objects.
    pub unknown_type_policy: UnknownTypePolicy,
    /// The selected wrapper preset.
    pub object_wrapper: WrapperChoice,
}

type Fallthrough = Box<dyn Fn(&str, &str) -> Result<(), SettingError> + Send + Sync>;

/// Builder for [`Engine`]. Accepts both string-keyed settings and typed
/// setters; everything is validated at `build()`.
pub struct EngineBuilder {
    compatibility_version: Version,
    template_update_delay_ms: u64,
    use_adapters_for_containers: bool,
    force_legacy_non_list_collections: bool,
    default_date_type: DateKind,
    unknown_type_policy: UnknownTypePolicy,
    object_wrapper: WrapperChoice,
    fallthrough: Option<Fallthrough>,
}

impl EngineBuilder {
    /// Defaults match the current version's wrapper behavior and a 5 second
    /// template update delay.
    pub fn new() -> Self {
        EngineBuilder {
            compatibility_version: CURRENT_VERSION,
            template_update_delay_ms: 5000,
            use_adapters_for_containers: true,
            force_legacy_non_list_collections: false,
            default_date_type: DateKind::Unknown,
            unknown_type_policy: UnknownTypePolicy::Generic,
            object_wrapper: WrapperChoice::Default,
            fallthrough: None,
        }
    }

    /// Apply a setting by name. Either naming convention works, legacy
    /// aliases resolve first, and names neither table knows go to the
    /// fallthrough handler if one is installed.
    pub fn set_setting(&mut self, name: &str, value: &str) -> Result<(), SettingError> {
        let canonical = match canonical_name(name) {
            Some(c) => c,
            None => {
                if let Some(handler) = &self.fallthrough {
                    return handler(name, value);
                }
                return Err(SettingError::UnknownName {
                    name: name.to_string(),
                });
            }
        };
        debug!(setting = canonical, value, "applying setting");
        match canonical {
            "template_update_delay" => {
                self.template_update_delay_ms = parse_duration_ms(canonical, value)?;
            }
            "use_adapters_for_containers" => {
                self.use_adapters_for_containers = parse_bool(canonical, value)?;
            }
            "force_legacy_non_list_collections" => {
                self.force_legacy_non_list_collections = parse_bool(canonical, value)?;
            }
            "default_date_type" => {
                self.default_date_type = parse_date_kind(canonical, value)?;
            }
            "unknown_type_policy" => {
                self.unknown_type_policy = parse_unknown_type_policy(canonical, value)?;
            }
            "object_wrapper" => {
                self.object_wrapper = parse_wrapper_choice(canonical, value)?;
            }
            _ => unreachable!("canonical names are exhaustive"),
        }
        Ok(())
    }

    /// Which version's behavior to request from shared components.
    pub fn compatibility_version(mut self, version: Version) -> Self {
        self.compatibility_version = version;
        self
    }

    /// Template re-check interval, in milliseconds.
    pub fn template_update_delay_ms(mut self, ms: u64) -> Self {
        self.template_update_delay_ms = ms;
        self
    }

    /// Wrap containers as live adapters (`true`) or eager copies (`false`).
    pub fn use_adapters_for_containers(mut self, yes: bool) -> Self {
        self.use_adapters_for_containers = yes;
        self
    }

    /// Copy non-list collections eagerly even when adapters are on.
    pub fn force_legacy_non_list_collections(mut self, yes: bool) -> Self {
        self.force_legacy_non_list_collections = yes;
        self
    }

    /// Date flavor assigned to generic instants.
    pub fn default_date_type(mut self, kind: DateKind) -> Self {
        self.default_date_type = kind;
        self
    }

    /// Policy for unclaimed host objects.
    pub fn unknown_type_policy(mut self, policy: UnknownTypePolicy) -> Self {
        self.unknown_type_policy = policy;
        self
    }

    /// Wrapper preset selected by the `object_wrapper` setting.
    pub fn object_wrapper(mut self, choice: WrapperChoice) -> Self {
        self.object_wrapper = choice;
        self
    }

    /// Install a handler for setting names the tables don't know.
    pub fn fallthrough<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str, &str) -> Result<(), SettingError> + Send + Sync + 'static,
    {
        self.fallthrough = Some(Box::new(handler));
        self
    }

    /// Freeze into an immutable [`Engine`].
    ///
    /// The object wrapper is resolved through the process-wide singleton
    /// registry, so engines built with identical wrapper settings share one
    /// wrapper instance.
    pub fn build(&self) -> Result<Engine, SettingError> {
        // The preset overrides individual flags.
        let (use_adapters, policy) = match self.object_wrapper {
            WrapperChoice::Default => (self.use_adapters_for_containers, self.unknown_type_policy),
            WrapperChoice::Legacy => (false, self.unknown_type_policy),
            WrapperChoice::Restrictive => {
                (self.use_adapters_for_containers, UnknownTypePolicy::Refuse)
            }
        };
        let props = vec![
            (
                "use_adapters_for_containers".to_string(),
                bool_token(use_adapters),
            ),
            (
                "force_legacy_non_list_collections".to_string(),
                bool_token(self.force_legacy_non_list_collections),
            ),
            (
                "default_date_type".to_string(),
                str_token(self.default_date_type),
            ),
            (
                "unknown_type_policy".to_string(),
                str_token(match policy {
                    UnknownTypePolicy::Generic => "generic",
                    UnknownTypePolicy::Refuse => "refuse",
                }),
            ),
        ];
        let wrapper = global().get_or_create::<WrapperSpec>(
            &[ArgValue::Version(self.compatibility_version)],
            &props,
            HoldStrength::Weak,
        )?;
        Ok(Engine {
            wrapper,
            settings: SettingsSnapshot {
                template_update_delay_ms: self.template_update_delay_ms,
                use_adapters_for_containers: use_adapters,
                force_legacy_non_list_collections: self.force_legacy_non_list_collections,
                default_date_type: self.default_date_type,
                unknown_type_policy: policy,
                object_wrapper: self.object_wrapper,
            },
        })
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        EngineBuilder::new()
    }
}

/// An immutable engine configuration: the shared object wrapper plus the
/// effective settings snapshot.
pub struct Engine {
    wrapper: Arc<ObjectWrapper>,
    settings: SettingsSnapshot,
}

impl Engine {
    /// Wrap a host value with this engine's wrapper.
    pub fn wrap(&self, host: Host) -> Result<Value, ModelError> {
        self.wrapper.wrap(host)
    }

    /// The shared object wrapper.
    pub fn wrapper(&self) -> &Arc<ObjectWrapper> {
        &self.wrapper
    }

    /// The effective settings.
    pub fn settings(&self) -> &SettingsSnapshot {
        &self.settings
    }

    /// Template re-check interval, in milliseconds.
    pub fn template_update_delay_ms(&self) -> u64 {
        self.settings.template_update_delay_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_conventions_resolve_the_same_setting() {
        let mut snake = EngineBuilder::new();
        snake.set_setting("template_update_delay", "30").unwrap();

        let mut camel = EngineBuilder::new();
        camel.set_setting("templateUpdateDelay", "30").unwrap();

        let snake = snake.build().unwrap();
        let camel = camel.build().unwrap();
        assert_eq!(snake.template_update_delay_ms(), 30_000);
        assert_eq!(camel.template_update_delay_ms(), 30_000);
    }

    #[test]
    fn duration_suffixes_apply() {
        let mut b = EngineBuilder::new();
        b.set_setting("template_update_delay", "500ms").unwrap();
        assert_eq!(b.build().unwrap().template_update_delay_ms(), 500);

        b.set_setting("template_update_delay", "30s").unwrap();
        assert_eq!(b.build().unwrap().template_update_delay_ms(), 30_000);

        b.set_setting("template_update_delay", "2m").unwrap();
        assert_eq!(b.build().unwrap().template_update_delay_ms(), 120_000);

        b.set_setting("template_update_delay", "1h").unwrap();
        assert_eq!(b.build().unwrap().template_update_delay_ms(), 3_600_000);
    }

    #[test]
    fn out_of_range_durations_are_value_errors() {
        let mut b = EngineBuilder::new();
        let err = b
            .set_setting("template_update_delay", "18446744073709551615")
            .unwrap_err();
        assert!(matches!(err, SettingError::BadValue { .. }));

        let err = b
            .set_setting("template_update_delay", "9999999999999999999h")
            .unwrap_err();
        assert!(matches!(err, SettingError::BadValue { .. }));
    }

    #[test]
    fn legacy_aliases_resolve_first() {
        let mut b = EngineBuilder::new();
        b.set_setting("use_adapters", "no").unwrap();
        b.set_setting("templateUpdateInterval", "10").unwrap();

        let engine = b.build().unwrap();
        assert!(!engine.settings().use_adapters_for_containers);
        assert_eq!(engine.template_update_delay_ms(), 10_000);
    }

    #[test]
    fn boolean_tokens_parse_loosely() {
        let mut b = EngineBuilder::new();
        for token in ["yes", "Y", "t", "TRUE"] {
            b.set_setting("use_adapters_for_containers", token).unwrap();
            assert!(b.build().unwrap().settings().use_adapters_for_containers);
        }
        for token in ["no", "N", "f", "False"] {
            b.set_setting("use_adapters_for_containers", token).unwrap();
            assert!(!b.build().unwrap().settings().use_adapters_for_containers);
        }
        let err = b.set_setting("use_adapters_for_containers", "maybe");
        assert!(matches!(err, Err(SettingError::BadValue { .. })));
    }

    #[test]
    fn unknown_names_error_without_a_fallthrough() {
        let mut b = EngineBuilder::new();
        let err = b.set_setting("no_such_setting", "1").unwrap_err();
        assert!(matches!(
            err,
            SettingError::UnknownName { name } if name == "no_such_setting"
        ));
    }

    #[test]
    fn fallthrough_handler_claims_unknown_names() {
        let mut b = EngineBuilder::new().fallthrough(|name, value| {
            assert_eq!(name, "custom_knob");
            assert_eq!(value, "on");
            Ok(())
        });
        b.set_setting("custom_knob", "on").unwrap();
        // Known names still bypass the handler.
        b.set_setting("default_date_type", "time").unwrap();
        assert_eq!(b.build().unwrap().settings().default_date_type, DateKind::Time);
    }

    #[test]
    fn engines_with_identical_wrapper_settings_share_the_wrapper() {
        let a = EngineBuilder::new()
            .default_date_type(DateKind::DateTime)
            .build()
            .unwrap();
        let b = EngineBuilder::new()
            .default_date_type(DateKind::DateTime)
            .build()
            .unwrap();
        assert!(Arc::ptr_eq(a.wrapper(), b.wrapper()));

        let c = EngineBuilder::new()
            .default_date_type(DateKind::Date)
            .build()
            .unwrap();
        assert!(!Arc::ptr_eq(a.wrapper(), c.wrapper()));
    }

    #[test]
    fn wrapper_presets_override_the_flags() {
        let legacy = EngineBuilder::new()
            .object_wrapper(WrapperChoice::Legacy)
            .build()
            .unwrap();
        assert!(!legacy.wrapper().uses_adapters());

        let restrictive = EngineBuilder::new()
            .object_wrapper(WrapperChoice::Restrictive)
            .build()
            .unwrap();
        assert_eq!(
            restrictive.wrapper().unknown_type_policy(),
            UnknownTypePolicy::Refuse
        );
    }

    #[test]
    fn engine_wrap_delegates_to_the_shared_wrapper() {
        let engine = EngineBuilder::new().build().unwrap();
        assert_eq!(engine.wrap(Host::Int(3)).unwrap(), Value::from(3i64));
    }

    #[test]
    fn settings_snapshot_serializes() {
        let engine = EngineBuilder::new().build().unwrap();
        let json = serde_json::to_value(engine.settings()).unwrap();
        assert_eq!(json["template_update_delay_ms"], 5000);
        assert_eq!(json["object_wrapper"], "default");
        assert_eq!(json["default_date_type"], "unknown");
    }
}
