//! Setup verification.

use std::fmt;

use cloner_media::{check_ffmpeg, check_ffprobe};

use crate::config::PipelineConfig;

/// Keys every full run needs. Alternatives are separated by `|`.
pub const REQUIRED_KEYS: &[&str] = &[
    "GEMINI_API_KEY",
    "KIE_API_KEY",
    "AIRTABLE_API_TOKEN|AIRTABLE_API_KEY",
    "AIRTABLE_BASE_ID",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: String,
    pub ok: bool,
    pub detail: String,
}

impl CheckResult {
    fn pass(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ok: true,
            detail: detail.into(),
        }
    }

    fn fail(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ok: false,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.ok { "ok  " } else { "FAIL" };
        write!(f, "[{mark}] {}: {}", self.name, self.detail)
    }
}

/// Unset, empty, or still the `your_...` placeholder from the example env file.
fn is_configured(value: Option<String>) -> bool {
    value.is_some_and(|v| {
        let v = v.trim();
        !v.is_empty() && !v.starts_with("your_")
    })
}

fn check_key(keys: &str, lookup: &impl Fn(&str) -> Option<String>) -> CheckResult {
    let found = keys.split('|').find(|key| is_configured(lookup(key)));
    match found {
        Some(key) => CheckResult::pass(keys, format!("{key} is set")),
        None => CheckResult::fail(keys, "missing or placeholder"),
    }
}

/// Check API keys, FFmpeg tools and the work directory.
pub async fn verify(config: &PipelineConfig) -> Vec<CheckResult> {
    let lookup = |key: &str| std::env::var(key).ok();
    let mut results: Vec<CheckResult> = REQUIRED_KEYS
        .iter()
        .map(|keys| check_key(keys, &lookup))
        .collect();

    results.push(match check_ffmpeg() {
        Ok(path) => CheckResult::pass("ffmpeg", path.display().to_string()),
        Err(e) => CheckResult::fail("ffmpeg", e.to_string()),
    });
    results.push(match check_ffprobe() {
        Ok(path) => CheckResult::pass("ffprobe", path.display().to_string()),
        Err(e) => CheckResult::fail("ffprobe", e.to_string()),
    });

    results.push(check_work_dir(config).await);

    results.push(if tokio::fs::try_exists(&config.inputs_dir).await.unwrap_or(false) {
        CheckResult::pass("inputs dir", config.inputs_dir.display().to_string())
    } else {
        // Only needed for auto-detected reference images.
        CheckResult::pass(
            "inputs dir",
            format!("{} not found, reference images must be passed explicitly", config.inputs_dir.display()),
        )
    });

    results
}

async fn check_work_dir(config: &PipelineConfig) -> CheckResult {
    let dir = &config.work_dir;
    let probe = dir.join(".cloner-write-check");
    let result = async {
        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(&probe, b"ok").await?;
        tokio::fs::remove_file(&probe).await
    }
    .await;
    match result {
        Ok(()) => CheckResult::pass("work dir", format!("{} is writable", dir.display())),
        Err(e) => CheckResult::fail("work dir", format!("{}: {e}", dir.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_key_alternatives() {
        let lookup = lookup_from(&[("AIRTABLE_API_KEY", "key123")]);
        let result = check_key("AIRTABLE_API_TOKEN|AIRTABLE_API_KEY", &lookup);
        assert!(result.ok);
        assert!(result.detail.contains("AIRTABLE_API_KEY"));
    }

    #[test]
    fn test_placeholder_rejected() {
        let lookup = lookup_from(&[("KIE_API_KEY", "your_kie_key"), ("GEMINI_API_KEY", " ")]);
        assert!(!check_key("KIE_API_KEY", &lookup).ok);
        assert!(!check_key("GEMINI_API_KEY", &lookup).ok);
        assert!(!check_key("AIRTABLE_BASE_ID", &lookup).ok);
    }

    #[tokio::test]
    async fn test_work_dir_writable() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = PipelineConfig {
            work_dir: dir.path().join("outputs"),
            ..PipelineConfig::default()
        };
        let result = check_work_dir(&config).await;
        assert!(result.ok, "{result}");
        assert!(!dir.path().join("outputs/.cloner-write-check").exists());
    }
}
