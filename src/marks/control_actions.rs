//! Mapping spreadsheet score columns onto portal control actions.
//!
//! A column names one or more labels to look for. When the portal lists
//! several actions with the same label (two "Контрольная работа" columns), the
//! column must also say which one it means via a [`MatchPosition`].

use std::collections::BTreeSet;
use std::fmt;

use crate::brs::models::ControlAction;
use crate::marks::names::normalize;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("control action column has no names to match")]
    NoNames,
    #[error("match index {index} is out of range for {count} matches")]
    IndexOutOfRange { index: usize, count: usize },
}

/// Which of `count` same-named actions to pick, 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchPosition {
    index: usize,
    count: usize,
}

impl MatchPosition {
    pub fn new(index: usize, count: usize) -> Result<Self, ConfigError> {
        if index >= count {
            return Err(ConfigError::IndexOutOfRange { index, count });
        }
        Ok(Self { index, count })
    }

    pub fn index(self) -> usize {
        self.index
    }

    pub fn count(self) -> usize {
        self.count
    }
}

/// One spreadsheet column's intended mapping to a portal control action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlActionConfig {
    names_to_match: BTreeSet<String>,
    position: Option<MatchPosition>,
    property_index: usize,
}

impl ControlActionConfig {
    pub fn new<I, S>(
        names: I,
        position: Option<MatchPosition>,
        property_index: usize,
    ) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names_to_match: BTreeSet<String> = names
            .into_iter()
            .map(|n| {
                let n: String = n.into();
                n.trim().to_string()
            })
            .filter(|n| !n.is_empty())
            .collect();
        if names_to_match.is_empty() {
            return Err(ConfigError::NoNames);
        }
        Ok(Self {
            names_to_match,
            position,
            property_index,
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names_to_match.iter().map(String::as_str)
    }

    pub fn position(&self) -> Option<MatchPosition> {
        self.position
    }

    /// Index into [`crate::marks::reconcile::ActualStudent::properties`].
    pub fn property_index(&self) -> usize {
        self.property_index
    }
}

impl fmt::Display for ControlActionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.names().collect();
        write!(f, "[{}]", names.join(", "))?;
        if let Some(pos) = self.position {
            write!(f, " #{}/{}", pos.index + 1, pos.count)?;
        }
        Ok(())
    }
}

/// A configured column together with the portal action it resolved to.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAction {
    pub config: ControlActionConfig,
    pub action: ControlAction,
}

fn known_actions_message(actions: &[ControlAction]) -> String {
    let names: Vec<&str> = actions.iter().map(|a| a.display_name.as_str()).collect();
    format!("found actions: {}", names.join(", "))
}

/// Resolve one column against the discipline's actions, in portal order.
///
/// Problems are appended to `errors` as an error line followed by a listing of
/// every known action; `None` is returned in that case.
pub fn resolve<'a>(
    config: &ControlActionConfig,
    actions: &'a [ControlAction],
    errors: &mut Vec<String>,
) -> Option<&'a ControlAction> {
    let wanted: BTreeSet<String> = config.names().map(normalize).collect();
    let matched: Vec<&ControlAction> = actions
        .iter()
        .filter(|a| wanted.contains(&normalize(&a.display_name)))
        .collect();

    if matched.is_empty() {
        errors.push(format!(
            "no control action matches {config} (column {})",
            config.property_index + 1
        ));
        errors.push(known_actions_message(actions));
        return None;
    }

    match config.position {
        Some(pos) => {
            if matched.len() != pos.count || pos.index >= pos.count {
                errors.push(format!(
                    "expected {} control actions matching {config}, found {}",
                    pos.count,
                    matched.len()
                ));
                errors.push(known_actions_message(actions));
                return None;
            }
            Some(matched[pos.index])
        }
        None if matched.len() > 1 => {
            errors.push(format!(
                "ambiguous control action {config}: {} matches, add a position like [1/{}]",
                matched.len(),
                matched.len()
            ));
            errors.push(known_actions_message(actions));
            None
        }
        None => Some(matched[0]),
    }
}

/// Resolve every configured column. Any failure rejects the whole set so the
/// group is skipped before a single write happens.
pub fn resolve_all(
    configs: &[ControlActionConfig],
    actions: &[ControlAction],
) -> Result<Vec<ResolvedAction>, Vec<String>> {
    let mut errors = Vec::new();
    let mut resolved = Vec::with_capacity(configs.len());

    for config in configs {
        if let Some(action) = resolve(config, actions, &mut errors) {
            resolved.push(ResolvedAction {
                config: config.clone(),
                action: action.clone(),
            });
        }
    }

    if errors.is_empty() {
        Ok(resolved)
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brs::models::CardType;

    fn action(id: &str, name: &str) -> ControlAction {
        ControlAction {
            id: id.to_string(),
            display_name: name.to_string(),
            card_type: CardType::Practice,
        }
    }

    fn two_tests() -> Vec<ControlAction> {
        vec![
            action("kr1", "Контрольная работа"),
            action("hw", "Домашнее задание"),
            action("kr2", "Контрольная работа"),
        ]
    }

    #[test]
    fn position_requires_index_below_count() {
        assert!(MatchPosition::new(1, 2).is_ok());
        assert_eq!(
            MatchPosition::new(2, 2),
            Err(ConfigError::IndexOutOfRange { index: 2, count: 2 })
        );
    }

    #[test]
    fn config_requires_names() {
        assert_eq!(
            ControlActionConfig::new(["  ", ""], None, 3),
            Err(ConfigError::NoNames)
        );
    }

    #[test]
    fn resolves_single_match_case_insensitively() {
        let actions = two_tests();
        let config = ControlActionConfig::new(["домашнее ЗАДАНИЕ"], None, 3).unwrap();
        let mut errors = Vec::new();
        let found = resolve(&config, &actions, &mut errors).unwrap();
        assert_eq!(found.id, "hw");
        assert!(errors.is_empty());
    }

    #[test]
    fn any_of_several_names() {
        let actions = two_tests();
        let config = ControlActionConfig::new(["ДЗ", "Домашнее задание"], None, 3).unwrap();
        let mut errors = Vec::new();
        assert_eq!(resolve(&config, &actions, &mut errors).unwrap().id, "hw");
    }

    #[test]
    fn no_prefix_matching_for_actions() {
        let actions = vec![action("a", "Задание 10")];
        let config = ControlActionConfig::new(["Задание 1"], None, 3).unwrap();
        let mut errors = Vec::new();
        assert!(resolve(&config, &actions, &mut errors).is_none());
    }

    #[test]
    fn disambiguates_by_position() {
        let actions = two_tests();
        let config = ControlActionConfig::new(
            ["Контрольная работа"],
            Some(MatchPosition::new(1, 2).unwrap()),
            4,
        )
        .unwrap();
        let mut errors = Vec::new();
        let found = resolve(&config, &actions, &mut errors).unwrap();
        assert_eq!(found.id, "kr2");
        assert!(errors.is_empty());
    }

    #[test]
    fn ambiguity_without_position_fails_closed() {
        let actions = two_tests();
        let config = ControlActionConfig::new(["Контрольная работа"], None, 4).unwrap();
        let mut errors = Vec::new();
        assert!(resolve(&config, &actions, &mut errors).is_none());
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("ambiguous"));
        assert_eq!(
            errors[1],
            "found actions: Контрольная работа, Домашнее задание, Контрольная работа"
        );
    }

    #[test]
    fn position_count_must_match() {
        let actions = two_tests();
        let config = ControlActionConfig::new(
            ["Контрольная работа"],
            Some(MatchPosition::new(0, 3).unwrap()),
            4,
        )
        .unwrap();
        let mut errors = Vec::new();
        assert!(resolve(&config, &actions, &mut errors).is_none());
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("expected 3"));
    }

    #[test]
    fn missing_action_lists_known_ones() {
        let actions = two_tests();
        let config = ControlActionConfig::new(["Экзамен"], None, 7).unwrap();
        let mut errors = Vec::new();
        assert!(resolve(&config, &actions, &mut errors).is_none());
        assert!(errors[0].contains("Экзамен"));
        assert!(errors[0].contains("column 8"));
        assert!(errors[1].starts_with("found actions: "));
    }

    #[test]
    fn resolve_all_collects_every_error() {
        let actions = two_tests();
        let configs = vec![
            ControlActionConfig::new(["Домашнее задание"], None, 3).unwrap(),
            ControlActionConfig::new(["Экзамен"], None, 4).unwrap(),
            ControlActionConfig::new(["Контрольная работа"], None, 5).unwrap(),
        ];
        let errors = resolve_all(&configs, &actions).unwrap_err();
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn resolve_all_keeps_config_order() {
        let actions = two_tests();
        let configs = vec![
            ControlActionConfig::new(
                ["Контрольная работа"],
                Some(MatchPosition::new(1, 2).unwrap()),
                5,
            )
            .unwrap(),
            ControlActionConfig::new(["Домашнее задание"], None, 3).unwrap(),
        ];
        let resolved = resolve_all(&configs, &actions).unwrap();
        let ids: Vec<&str> = resolved.iter().map(|r| r.action.id.as_str()).collect();
        assert_eq!(ids, ["kr2", "hw"]);
    }
}
