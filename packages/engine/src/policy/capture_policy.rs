// packages/engine/src/policy/capture_policy.rs
//! Category flags derived from a configuration token string

use crate::utils::errors::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const TOKEN_ALL: &str = "ALL";
pub const TOKEN_NONE: &str = "NONE";
pub const TOKEN_EXEC: &str = "EXEC";
pub const TOKEN_CALL: &str = "CALL";
pub const TOKEN_FIELD: &str = "FIELD";
pub const TOKEN_ARRAY: &str = "ARRAY";
pub const TOKEN_SYNC: &str = "SYNC";
pub const TOKEN_OBJECT: &str = "OBJECT";
pub const TOKEN_PARAM: &str = "PARAM";
pub const TOKEN_LOCAL: &str = "LOCAL";
pub const TOKEN_LABEL: &str = "LABEL";
pub const TOKEN_LINE: &str = "LINE";

const CONFIG_SEPARATOR: &str = ",";

/// Event categories a policy can switch on or off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Method entry/exit observed on the callee side
    Exec,
    /// Calls observed on the caller side
    Call,
    Field,
    Array,
    /// Monitor enter/exit
    Sync,
    Parameters,
    Locals,
    Line,
    /// Control-flow labels
    Label,
    /// Deep object snapshots
    Object,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Category::Exec,
        Category::Call,
        Category::Field,
        Category::Array,
        Category::Sync,
        Category::Parameters,
        Category::Locals,
        Category::Line,
        Category::Label,
        Category::Object,
    ];

    /// Configuration token enabling this category
    pub fn token(&self) -> &'static str {
        match self {
            Category::Exec => TOKEN_EXEC,
            Category::Call => TOKEN_CALL,
            Category::Field => TOKEN_FIELD,
            Category::Array => TOKEN_ARRAY,
            Category::Sync => TOKEN_SYNC,
            Category::Parameters => TOKEN_PARAM,
            Category::Locals => TOKEN_LOCAL,
            Category::Line => TOKEN_LINE,
            Category::Label => TOKEN_LABEL,
            Category::Object => TOKEN_OBJECT,
        }
    }
}

/// Orthogonal refinement applied on top of a derived policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailLevel {
    /// Keep the parent's flags as they are
    #[default]
    Normal,
    /// Skip array initializer instrumentation (large generated classes)
    IgnoreArrayInitializer,
    /// Keep method entry/exit only
    OnlyEntryExit,
}

/// Which categories of events are captured
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturePolicy {
    exec: bool,
    call: bool,
    field: bool,
    array: bool,
    sync: bool,
    parameters: bool,
    locals: bool,
    line: bool,
    label: bool,
    object: bool,
    /// Explicitly configured to record nothing
    disabled: bool,
    ignore_array_initializer: bool,
    entry_exit_only: bool,
}

impl CapturePolicy {
    /// Derive a policy from a configuration string.
    ///
    /// `"ALL"` and `"NONE"` are exact matches, `""` selects the default set,
    /// anything else enables each category whose token occurs anywhere in the
    /// upper-cased input. There is no delimiter grammar: `"EXEC+CALL"`,
    /// `"exec,call"` and `"EXECCALL"` are equivalent.
    pub fn derive(config: &str) -> Result<Self> {
        let policy = Self::parse(config);
        if !policy.is_valid() {
            return Err(EngineError::InvalidPolicy(format!(
                "'{}' enables no event category",
                config
            )));
        }
        Ok(policy)
    }

    fn parse(config: &str) -> Self {
        let upper = config.trim().to_uppercase();
        let mut policy = Self::default();

        let expanded = match upper.as_str() {
            TOKEN_ALL => Category::ALL
                .iter()
                .map(|c| c.token())
                .collect::<Vec<_>>()
                .concat(),
            "" => [
                TOKEN_EXEC,
                TOKEN_CALL,
                TOKEN_FIELD,
                TOKEN_ARRAY,
                TOKEN_SYNC,
                TOKEN_OBJECT,
                TOKEN_PARAM,
            ]
            .concat(),
            TOKEN_NONE => {
                policy.disabled = true;
                String::new()
            }
            _ => upper,
        };

        for category in Category::ALL {
            policy.set(category, expanded.contains(category.token()));
        }
        policy
    }

    /// A policy that is explicitly disabled
    pub fn disabled() -> Self {
        Self {
            disabled: true,
            ..Self::default()
        }
    }

    /// Derive a narrowed copy for the given detail level
    pub fn narrow(&self, level: DetailLevel) -> Self {
        let mut narrowed = *self;
        match level {
            DetailLevel::Normal => {}
            DetailLevel::IgnoreArrayInitializer => {
                narrowed.ignore_array_initializer = true;
            }
            DetailLevel::OnlyEntryExit => {
                for category in Category::ALL {
                    if category != Category::Exec {
                        narrowed.set(category, false);
                    }
                }
                narrowed.entry_exit_only = true;
            }
        }
        narrowed
    }

    /// True if some category is on or the policy is explicitly disabled.
    /// A policy with neither silently records nothing and must not be used.
    pub fn is_valid(&self) -> bool {
        self.disabled || Category::ALL.iter().any(|c| self.allows(*c))
    }

    pub fn allows(&self, category: Category) -> bool {
        match category {
            Category::Exec => self.exec,
            Category::Call => self.call,
            Category::Field => self.field,
            Category::Array => self.array,
            Category::Sync => self.sync,
            Category::Parameters => self.parameters,
            Category::Locals => self.locals,
            Category::Line => self.line,
            Category::Label => self.label,
            Category::Object => self.object,
        }
    }

    fn set(&mut self, category: Category, on: bool) {
        let flag = match category {
            Category::Exec => &mut self.exec,
            Category::Call => &mut self.call,
            Category::Field => &mut self.field,
            Category::Array => &mut self.array,
            Category::Sync => &mut self.sync,
            Category::Parameters => &mut self.parameters,
            Category::Locals => &mut self.locals,
            Category::Line => &mut self.line,
            Category::Label => &mut self.label,
            Category::Object => &mut self.object,
        };
        *flag = on;
    }

    pub fn records_execution(&self) -> bool {
        self.exec
    }

    pub fn records_method_call(&self) -> bool {
        self.call
    }

    pub fn records_field_access(&self) -> bool {
        self.field
    }

    pub fn records_array(&self) -> bool {
        self.array
    }

    pub fn records_synchronization(&self) -> bool {
        self.sync
    }

    pub fn records_parameters(&self) -> bool {
        self.parameters
    }

    pub fn records_locals(&self) -> bool {
        self.locals
    }

    pub fn records_line_number(&self) -> bool {
        self.line
    }

    pub fn records_label(&self) -> bool {
        self.label
    }

    /// Deep serialization of observed objects
    pub fn records_object(&self) -> bool {
        self.object
    }

    /// Catch blocks are woven whenever any intra-method category is on
    pub fn records_catch(&self) -> bool {
        self.call || self.field || self.array || self.label || self.sync
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn ignores_array_initializer(&self) -> bool {
        self.ignore_array_initializer
    }

    pub fn is_entry_exit_only(&self) -> bool {
        self.entry_exit_only
    }

    /// Render the enabled tokens, comma separated.
    /// Deriving from the result reproduces the category flags.
    pub fn to_config_string(&self) -> String {
        if self.disabled {
            return TOKEN_NONE.to_string();
        }
        Category::ALL
            .iter()
            .filter(|c| self.allows(**c))
            .map(|c| c.token())
            .collect::<Vec<_>>()
            .join(CONFIG_SEPARATOR)
    }
}

impl fmt::Display for CapturePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.to_config_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = CapturePolicy::derive("").unwrap();

        assert!(policy.records_execution());
        assert!(policy.records_method_call());
        assert!(policy.records_field_access());
        assert!(policy.records_array());
        assert!(policy.records_synchronization());
        assert!(policy.records_object());
        assert!(policy.records_parameters());

        assert!(!policy.records_locals());
        assert!(!policy.records_line_number());
        assert!(!policy.records_label());
        assert!(!policy.is_disabled());
    }

    #[test]
    fn test_all_policy() {
        let policy = CapturePolicy::derive("all").unwrap();
        for category in Category::ALL {
            assert!(policy.allows(category), "{:?} should be on", category);
        }
    }

    #[test]
    fn test_none_policy_is_disabled_but_valid() {
        let policy = CapturePolicy::derive("NONE").unwrap();

        assert!(policy.is_disabled());
        assert!(policy.is_valid());
        for category in Category::ALL {
            assert!(!policy.allows(category));
        }
    }

    #[test]
    fn test_union_of_substrings() {
        let policy = CapturePolicy::derive("exec+param+local").unwrap();
        assert!(policy.records_execution());
        assert!(policy.records_parameters());
        assert!(policy.records_locals());
        assert!(!policy.records_method_call());
        assert!(!policy.records_object());

        // no delimiter needed
        let glued = CapturePolicy::derive("CALLFIELD").unwrap();
        assert!(glued.records_method_call());
        assert!(glued.records_field_access());
    }

    #[test]
    fn test_unknown_tokens_rejected() {
        let result = CapturePolicy::derive("everything please");
        assert!(matches!(result, Err(EngineError::InvalidPolicy(_))));
    }

    #[test]
    fn test_object_alone_is_valid() {
        let policy = CapturePolicy::derive("OBJECT").unwrap();
        assert!(policy.records_object());
        assert!(!policy.records_execution());
    }

    #[test]
    fn test_narrow_entry_exit_only() {
        let parent = CapturePolicy::derive("ALL").unwrap();
        let narrowed = parent.narrow(DetailLevel::OnlyEntryExit);

        assert!(narrowed.records_execution());
        assert!(narrowed.is_entry_exit_only());
        for category in Category::ALL {
            if category != Category::Exec {
                assert!(!narrowed.allows(category), "{:?} should be cleared", category);
            }
        }

        // parent untouched
        assert!(parent.records_method_call());
        assert!(!parent.is_entry_exit_only());
    }

    #[test]
    fn test_narrow_ignore_array_initializer() {
        let parent = CapturePolicy::derive("").unwrap();
        let narrowed = parent.narrow(DetailLevel::IgnoreArrayInitializer);

        assert!(narrowed.ignores_array_initializer());
        assert!(narrowed.records_array());
        assert!(narrowed.records_object());
        assert!(!parent.ignores_array_initializer());
    }

    #[test]
    fn test_narrow_normal_is_copy() {
        let parent = CapturePolicy::derive("EXEC,OBJECT").unwrap();
        assert_eq!(parent.narrow(DetailLevel::Normal), parent);
    }

    #[test]
    fn test_records_catch() {
        assert!(CapturePolicy::derive("SYNC").unwrap().records_catch());
        assert!(!CapturePolicy::derive("EXEC,PARAM").unwrap().records_catch());
    }

    #[test]
    fn test_config_string_roundtrip() {
        for input in ["", "ALL", "NONE", "EXEC,LINE", "OBJECT+LABEL"] {
            let policy = CapturePolicy::derive(input).unwrap();
            let rendered = policy.to_config_string();
            assert_eq!(CapturePolicy::derive(&rendered).unwrap(), policy, "input {:?}", input);
        }
    }
}
