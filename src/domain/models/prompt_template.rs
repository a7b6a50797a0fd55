#[cfg(test)]
#[path = "prompt_template_test.rs"]
mod tests;

use std::collections::HashMap;

use anyhow::bail;
use anyhow::Result;
use snafu::ensure;

use super::error::InvalidTemplateSnafu;
use super::error::MissingTemplateFieldsSnafu;
use super::ChatResult;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptTemplate {
    pub name: String,
    pub body: String,
    pub required_fields: Vec<String>,
}

impl PromptTemplate {
    pub fn new(name: &str, body: &str, required_fields: &[&str]) -> PromptTemplate {
        return PromptTemplate {
            name: name.to_string(),
            body: body.to_string(),
            required_fields: required_fields
                .iter()
                .map(|field| return field.to_string())
                .collect(),
        };
    }

    /// Parses a template from the `[template]` table of a TOML document.
    pub fn from_toml(toml_str: &str) -> Result<PromptTemplate> {
        let doc = toml_str.parse::<toml_edit::Document>()?;
        let table = match doc.get("template").and_then(|item| return item.as_table()) {
            Some(table) => table,
            None => bail!("Template file is missing a [template] table"),
        };

        let name = table
            .get("name")
            .and_then(|item| return item.as_str())
            .unwrap_or("unnamed");
        let body = match table.get("body").and_then(|item| return item.as_str()) {
            Some(body) => body,
            None => bail!(format!("Template '{name}' has no body")),
        };

        let mut required_fields = vec![];
        if let Some(required) = table.get("required").and_then(|item| return item.as_array()) {
            for field in required.iter() {
                match field.as_str() {
                    Some(field) => required_fields.push(field.to_string()),
                    None => bail!(format!(
                        "Template '{name}' has a non-string entry in required"
                    )),
                }
            }
        }

        return Ok(PromptTemplate {
            name: name.to_string(),
            body: body.to_string(),
            required_fields,
        });
    }

    /// Required fields that are absent or blank, in declaration order.
    pub fn missing_fields(&self, values: &HashMap<String, String>) -> Vec<String> {
        return self
            .required_fields
            .iter()
            .filter(|field| {
                return values
                    .get(field.as_str())
                    .map(|value| return value.trim().is_empty())
                    .unwrap_or(true);
            })
            .cloned()
            .collect();
    }

    /// Substitutes `{{field}}` placeholders. Optional placeholders without a
    /// value render as empty strings.
    pub fn render(&self, values: &HashMap<String, String>) -> ChatResult<String> {
        let missing = self.missing_fields(values);
        ensure!(
            missing.is_empty(),
            MissingTemplateFieldsSnafu {
                template: self.name.to_string(),
                fields: missing,
            }
        );

        let mut res = String::with_capacity(self.body.len());
        let mut rest = self.body.as_str();
        while let Some(start) = rest.find("{{") {
            res += &rest[..start];
            let after = &rest[start + 2..];
            let end = match after.find("}}") {
                Some(end) => end,
                None => {
                    return InvalidTemplateSnafu {
                        details: format!("unclosed placeholder in template '{}'", self.name),
                    }
                    .fail();
                }
            };

            let field = after[..end].trim();
            if let Some(value) = values.get(field) {
                res += value;
            }
            rest = &after[end + 2..];
        }
        res += rest;

        return Ok(res);
    }
}
