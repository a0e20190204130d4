//! Regex find-and-replace rules applied to item definition files.

use regex::Regex;

use crate::variables::{Template, VariableBag};
use crate::{ConfigError, ConfigResult};

/// One find-and-replace step: a regex and a replacement template.
#[derive(Debug, Clone)]
pub struct SubstitutionRule {
    pattern: Regex,
    template: Template,
}

/// Output of applying a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substituted {
    pub text: String,
    /// Number of non-overlapping matches that were replaced.
    pub count: usize,
}

impl SubstitutionRule {
    /// Compile a rule. Group references in `replacement` must exist in
    /// `pattern`.
    pub fn new(pattern: &str, replacement: &str) -> ConfigResult<Self> {
        let regex = Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        let template = Template::parse(replacement)?;

        if let Some(group) = template.max_group() {
            let available = regex.captures_len() - 1;
            if group > available {
                return Err(ConfigError::InvalidTemplate {
                    template: replacement.to_string(),
                    message: format!(
                        "references group {} but pattern has {} group(s)",
                        group, available
                    ),
                });
            }
        }

        Ok(Self {
            pattern: regex,
            template,
        })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    /// Render the template against `bag` and replace every match in `text`.
    ///
    /// The template is rendered before matching, so a missing placeholder
    /// fails even when the pattern would not match.
    pub fn apply(&self, text: &str, bag: &VariableBag) -> ConfigResult<Substituted> {
        let replacement = self.template.render(bag)?;
        let count = self.pattern.find_iter(text).count();
        let text = if count == 0 {
            text.to_string()
        } else {
            self.pattern.replace_all(text, &replacement).into_owned()
        };
        Ok(Substituted { text, count })
    }
}

/// Apply `rules` in order, each seeing the output of the previous one.
/// Returns the final text and the match count of every rule.
pub fn apply_all(
    rules: &[SubstitutionRule],
    text: &str,
    bag: &VariableBag,
) -> ConfigResult<(String, Vec<usize>)> {
    let mut current = text.to_string();
    let mut counts = Vec::with_capacity(rules.len());
    for rule in rules {
        let out = rule.apply(&current, bag)?;
        current = out.text;
        counts.push(out.count);
    }
    Ok((current, counts))
}
