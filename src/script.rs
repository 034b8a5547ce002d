use std::fmt;

use serde::{Deserialize, Serialize};

use crate::aggregate::MetadataBundle;
use crate::error::SyncError;

/// Range of datapoints FETCH selects per series; the default takes the latest one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchWindow {
    /// End timestamp in platform time units, `None` for NOW.
    pub end: Option<i64>,
    /// Negative values count datapoints, positive values are a duration.
    pub span: i64,
}

impl Default for FetchWindow {
    fn default() -> Self {
        Self { end: None, span: -1 }
    }
}

impl fmt::Display for FetchWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "{end} {}", self.span),
            None => write!(f, "NOW {}", self.span),
        }
    }
}

/// One rendered update script, bound to a single bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncScript {
    pub id: String,
    pub label_pattern: String,
    body: String,
}

impl SyncScript {
    pub fn as_str(&self) -> &str {
        &self.body
    }
}

/// Renders bundles into WarpScript that stores the attribute JSON, fetches the
/// matching series, merges the attributes onto each of them and writes the
/// metadata back.
#[derive(Debug, Clone)]
pub struct SyncScriptGenerator {
    label: String,
    window: FetchWindow,
}

impl SyncScriptGenerator {
    pub fn new(label: &str) -> Result<Self, SyncError> {
        check_plain("label", label)?;
        Ok(Self {
            label: label.to_string(),
            window: FetchWindow::default(),
        })
    }

    pub fn with_window(mut self, window: FetchWindow) -> Self {
        self.window = window;
        self
    }

    pub fn check_tokens(&self, read_token: &str, write_token: &str) -> Result<(), SyncError> {
        check_plain("read token", read_token)?;
        check_plain("write token", write_token)
    }

    pub fn render(
        &self,
        bundle: &MetadataBundle,
        read_token: &str,
        write_token: &str,
    ) -> Result<SyncScript, SyncError> {
        self.check_tokens(read_token, write_token)?;
        let pattern = label_pattern(&bundle.fragments)?;
        let payload = serde_json::to_string(&bundle.attributes)
            .map_err(|err| SyncError::InvalidScript(err.to_string()))?;

        let body = format!(
            "'{payload}' JSON-> 'attributes' STORE\n\
             [ '{read_token}' '~.*' {{ '{label}' '{pattern}' }} {window} ] FETCH\n\
             <% DROP $attributes SETATTRIBUTES %> LMAP\n\
             '{write_token}' META\n",
            payload = escape_literal(&payload),
            label = self.label,
            window = self.window,
        );

        Ok(SyncScript {
            id: bundle.id.clone(),
            label_pattern: pattern,
            body,
        })
    }
}

/// `~(a)|(b)|...` over the fragments, in their stored order.
pub fn label_pattern(fragments: &[String]) -> Result<String, SyncError> {
    if fragments.is_empty() {
        return Err(SyncError::InvalidScript(
            "bundle has no file identifiers to match".to_string(),
        ));
    }
    let mut alternatives = Vec::with_capacity(fragments.len());
    for fragment in fragments {
        check_plain("file identifier", fragment)?;
        alternatives.push(format!("({})", regex::escape(fragment)));
    }
    Ok(format!("~{}", alternatives.join("|")))
}

fn check_plain(what: &str, value: &str) -> Result<(), SyncError> {
    let is_valid = !value.is_empty()
        && value
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-'));
    if !is_valid {
        return Err(SyncError::InvalidScript(format!("invalid {what}: {value:?}")));
    }
    Ok(())
}

/// WarpScript URL-decodes string literals, so quoting survives as percent escapes.
fn escape_literal(value: &str) -> String {
    value.replace('%', "%25").replace('\'', "%27")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_quotes_and_percent() {
        assert_eq!(escape_literal("it's 100%"), "it%27s 100%25");
    }

    #[test]
    fn window_rendering() {
        assert_eq!(FetchWindow::default().to_string(), "NOW -1");
        let window = FetchWindow {
            end: Some(1_500_000_000_000_000),
            span: 86_400_000_000,
        };
        assert_eq!(window.to_string(), "1500000000000000 86400000000");
    }
}
