//! Pattern rules for synthesizing resources from unmatched names.
//!
//! A resource type may carry any number of `(pattern, priority, generator)`
//! rules. When a name has no explicit registration, the rules are consulted
//! from the highest priority down, in declaration order within a priority,
//! and the first rule whose pattern matches the whole name builds the
//! resource.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::error::{ResourceError, ResourceResult};
use crate::resource::Resource;
use crate::resource_type::ResourceType;
use crate::value::Value;

/// Builds a resource for a matched name.
///
/// Receives the type the rule is attached to (the acting type) and the
/// match, and must return an instance of that type or a subtype.
pub type Generator =
    Arc<dyn Fn(&ResourceType, &PatternMatch) -> ResourceResult<Resource> + Send + Sync>;

/// A successful match of a name against a pattern rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternMatch {
    /// The full name that matched
    pub name: String,
    /// Capture groups in order; groups that did not participate are `None`
    pub captures: Vec<Option<String>>,
}

impl PatternMatch {
    /// Get capture group `index` (0-based, excluding the whole match).
    pub fn capture(&self, index: usize) -> Option<&str> {
        self.captures.get(index).and_then(|c| c.as_deref())
    }

    /// Get capture group `index` as an attribute value, `Null` when absent.
    pub fn capture_value(&self, index: usize) -> Value {
        Value::from(self.capture(index))
    }
}

/// Options accepted by a pattern declaration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatternOptions {
    pub priority: i32,
}

impl PatternOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Parse options from key/value pairs.
    ///
    /// Only an integer `priority` is recognized; anything else fails with
    /// [`ResourceError::InvalidPatternOption`].
    pub fn from_pairs<K, V, I>(pairs: I) -> ResourceResult<Self>
    where
        K: AsRef<str>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut options = Self::new();
        let mut invalid = Vec::new();

        for (key, value) in pairs {
            let key = key.as_ref();
            let value: Value = value.into();
            match (key, value.as_int().and_then(|p| i32::try_from(p).ok())) {
                ("priority", Some(priority)) => options.priority = priority,
                _ => invalid.push(key.to_string()),
            }
        }

        if !invalid.is_empty() {
            return Err(ResourceError::InvalidPatternOption(invalid.join(", ")));
        }
        Ok(options)
    }
}

/// One `(pattern, priority, generator)` rule.
pub struct PatternRule {
    pattern: String,
    regex: Regex,
    priority: i32,
    generator: Generator,
}

impl PatternRule {
    /// Compile a rule. The pattern always has to match the whole name.
    pub fn new(pattern: &str, priority: i32, generator: Generator) -> ResourceResult<Self> {
        let regex = Regex::new(&format!("^(?:{})$", pattern)).map_err(|source| {
            ResourceError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            }
        })?;

        Ok(Self {
            pattern: pattern.to_string(),
            regex,
            priority,
            generator,
        })
    }

    /// The pattern source as declared.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Match `name` against the rule.
    pub fn matches(&self, name: &str) -> Option<PatternMatch> {
        let caps = self.regex.captures(name)?;
        Some(PatternMatch {
            name: name.to_string(),
            captures: caps
                .iter()
                .skip(1)
                .map(|c| c.map(|m| m.as_str().to_string()))
                .collect(),
        })
    }

    /// Run the generator with `acting` as the acting type.
    pub fn generate(&self, acting: &ResourceType, matched: &PatternMatch) -> ResourceResult<Resource> {
        (self.generator)(acting, matched)
    }
}

impl fmt::Debug for PatternRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternRule")
            .field("pattern", &self.pattern)
            .field("priority", &self.priority)
            .finish()
    }
}

/// Priority-ordered rules attached to one resource type.
#[derive(Debug, Default)]
pub struct PatternTable {
    rules: BTreeMap<i32, Vec<Arc<PatternRule>>>,
}

impl PatternTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule.
    ///
    /// A rule with an equal pattern at the same priority is removed first,
    /// so the new rule always lands at the end of its priority's list.
    pub fn add(&mut self, rule: PatternRule) {
        let list = self.rules.entry(rule.priority).or_default();
        list.retain(|existing| existing.pattern != rule.pattern);
        list.push(Arc::new(rule));
    }

    /// Snapshot of all rules in consultation order.
    pub fn rules(&self) -> Vec<Arc<PatternRule>> {
        self.rules
            .iter()
            .rev()
            .flat_map(|(_, list)| list.iter().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rules.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.values().all(Vec::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_generator() -> Generator {
        Arc::new(|ty: &ResourceType, _m: &PatternMatch| {
            Err(ResourceError::ResourceNotFound {
                type_name: ty.name().to_string(),
                name: "unused".to_string(),
            })
        })
    }

    fn rule(pattern: &str, priority: i32) -> PatternRule {
        PatternRule::new(pattern, priority, unreachable_generator()).unwrap()
    }

    fn patterns(table: &PatternTable) -> Vec<(String, i32)> {
        table
            .rules()
            .iter()
            .map(|r| (r.pattern().to_string(), r.priority()))
            .collect()
    }

    #[test]
    fn test_rules_ordered_by_priority_then_insertion() {
        let mut table = PatternTable::new();
        table.add(rule("a", 0));
        table.add(rule("b", 10));
        table.add(rule("c", -1));
        table.add(rule("d", 0));

        assert_eq!(
            patterns(&table),
            vec![
                ("b".to_string(), 10),
                ("a".to_string(), 0),
                ("d".to_string(), 0),
                ("c".to_string(), -1),
            ]
        );
    }

    #[test]
    fn test_readding_pattern_moves_it_to_end() {
        let mut table = PatternTable::new();
        table.add(rule("a", 0));
        table.add(rule("b", 0));
        table.add(rule("a", 0));

        assert_eq!(table.len(), 2);
        assert_eq!(
            patterns(&table),
            vec![("b".to_string(), 0), ("a".to_string(), 0)]
        );
    }

    #[test]
    fn test_same_pattern_at_other_priority_is_kept() {
        let mut table = PatternTable::new();
        table.add(rule("a", 0));
        table.add(rule("a", 5));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_match_is_anchored() {
        let r = rule(r"(\w+)@(.+)", 0);
        assert!(r.matches("alice@db1").is_some());
        assert!(r.matches(" alice@db1").is_none());

        let r = rule("db", 0);
        assert!(r.matches("db").is_some());
        assert!(r.matches("db1").is_none());
        assert!(r.matches("mydb").is_none());
    }

    #[test]
    fn test_optional_captures() {
        let r = rule(r"(?:([^@:]*)(?::([^@]*))?@)?([A-Za-z0-9.-]+)", 0);

        let m = r.matches("db1").unwrap();
        assert_eq!(m.capture(0), None);
        assert_eq!(m.capture(1), None);
        assert_eq!(m.capture(2), Some("db1"));
        assert_eq!(m.capture_value(0), Value::Null);

        let m = r.matches("bob:pw@db1").unwrap();
        assert_eq!(m.capture(0), Some("bob"));
        assert_eq!(m.capture(1), Some("pw"));
        assert_eq!(m.capture(2), Some("db1"));
    }

    #[test]
    fn test_invalid_pattern() {
        let result = PatternRule::new("(", 0, unreachable_generator());
        assert!(matches!(result, Err(ResourceError::InvalidPattern { .. })));
    }

    #[test]
    fn test_pattern_options_from_pairs() {
        let options = PatternOptions::from_pairs(vec![("priority", -1)]).unwrap();
        assert_eq!(options.priority, -1);

        let err = PatternOptions::from_pairs(vec![("prio", 1)]).unwrap_err();
        assert!(matches!(err, ResourceError::InvalidPatternOption(_)));
    }
}
