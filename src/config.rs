//! Job configuration: the YAML merge-job description and run modes.

use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};

use crate::error::ConfigError;
use crate::expr::Value;

/// A merge job, loaded once and immutable for the run.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobSpec {
    #[serde(default)]
    pub grist_root_url: Option<String>,
    #[serde(default)]
    pub grist_doc_id: Option<String>,
    /// Names bound positionally to the command-line arguments.
    #[serde(default)]
    pub parameters: Option<Vec<String>>,
    pub query: String,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub update: Option<TableRule>,
    #[serde(default)]
    pub insert: Vec<TableRule>,
    #[serde(default)]
    pub to: Vec<RecipientSpec>,
    #[serde(default)]
    pub cc: Vec<RecipientSpec>,
    #[serde(default)]
    pub bcc: Vec<RecipientSpec>,
    /// Sender; when absent the mail transport fills it in.
    #[serde(default)]
    pub from: Option<RecipientSpec>,
    /// IANA timezone for `format_timestamp`.
    #[serde(default)]
    pub timezone: Option<String>,
}

/// `{table, fields}` for an update or insert rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableRule {
    pub table: String,
    /// Field name → snippet source, in declaration order.
    #[serde(deserialize_with = "ordered_snippets")]
    pub fields: Vec<(String, String)>,
}

/// Declarative recipient description. `name` and `email` are templates.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecipientSpec {
    #[serde(default)]
    pub name: Option<String>,
    pub email: String,
    #[serde(default)]
    pub semicolon_separated: bool,
}

/// Render a YAML scalar back into snippet source.
///
/// Job files are written as if every value were a string, so `greeted: True`
/// must reach the evaluator as the text `True`, not as a YAML boolean.
fn scalar_source(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Bool(true) => Some("True".into()),
        serde_yaml::Value::Bool(false) => Some("False".into()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Null => Some("None".into()),
        _ => None,
    }
}

fn ordered_snippets<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as _;

    let mapping = serde_yaml::Mapping::deserialize(deserializer)?;
    mapping
        .iter()
        .map(|(k, v)| {
            let key = scalar_source(k)
                .ok_or_else(|| D::Error::custom("field names must be scalars"))?;
            let code = scalar_source(v).ok_or_else(|| {
                D::Error::custom(format!("snippet for field '{key}' must be a scalar"))
            })?;
            Ok((key, code))
        })
        .collect()
}

impl JobSpec {
    /// Parse and validate a job description.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let spec: JobSpec = serde_yaml::from_str(text)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Read, parse, and validate a job file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.timezone()?;
        let rules = self.update.iter().map(|r| ("update", r));
        let rules = rules.chain(self.insert.iter().map(|r| ("insert", r)));
        for (kind, rule) in rules {
            if rule.table.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: format!("{kind}.table"),
                    message: "table name must not be empty".into(),
                });
            }
        }
        if let Some(params) = &self.parameters
            && let Some(dup) = params
                .iter()
                .enumerate()
                .find_map(|(i, p)| params[..i].contains(p).then_some(p))
        {
            return Err(ConfigError::InvalidValue {
                key: "parameters".into(),
                message: format!("parameter '{dup}' declared twice"),
            });
        }
        Ok(())
    }

    /// The configured timezone, parsed.
    pub fn timezone(&self) -> Result<Option<Tz>, ConfigError> {
        self.timezone
            .as_deref()
            .map(|name| {
                name.parse::<Tz>()
                    .map_err(|_| ConfigError::UnknownTimezone(name.to_string()))
            })
            .transpose()
    }

    /// Bind command-line arguments to the declared parameter names.
    ///
    /// Fails when the counts differ. Without declared parameters any
    /// arguments are ignored.
    pub fn bind_parameters(&self, args: &[String]) -> Result<Vec<(String, Value)>, ConfigError> {
        let Some(names) = &self.parameters else {
            return Ok(Vec::new());
        };
        if names.len() != args.len() {
            return Err(ConfigError::ParameterCount {
                required: names.len(),
                supplied: args.len(),
            });
        }
        Ok(names
            .iter()
            .zip(args)
            .map(|(name, arg)| (name.clone(), Value::Str(arg.clone())))
            .collect())
    }
}

/// Job-level modes from the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Render and preview only; never send or write back.
    pub dry_run: bool,
    /// Skip sending but write back as if every send succeeded.
    pub no_email: bool,
    /// Print a preview of every message.
    pub verbose: bool,
}

impl RunOptions {
    pub fn shows_previews(&self) -> bool {
        self.dry_run || self.verbose
    }

    pub fn sends_email(&self) -> bool {
        !self.dry_run && !self.no_email
    }

    pub fn writes_back(&self) -> bool {
        !self.dry_run
    }
}

/// Default location of the Grist API key file (`~/.grist-api-key`).
pub fn default_api_key_path() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".grist-api-key")
}

/// Read an API key file, trimming surrounding whitespace.
pub fn load_api_key(path: &Path) -> Result<SecretString, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let key = text.trim();
    if key.is_empty() {
        return Err(ConfigError::InvalidValue {
            key: "api key".into(),
            message: format!("{} is empty", path.display()),
        });
    }
    Ok(SecretString::from(key.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    const JOB: &str = r#"
grist_root_url: https://grist.example.com
grist_doc_id: abc
parameters: [year]
query: SELECT id, name FROM People WHERE joined < {{year}}
subject: Hello {{name}}
body: |
  Dear {{name}},
  welcome.
update:
  table: People
  fields:
    greeted: True
    visits: visits + 1
insert:
  - table: Log
    fields:
      person: id
to:
  - name: "{{name}}"
    email: "{{email}}"
timezone: Europe/Berlin
"#;

    #[test]
    fn parses_a_full_job() {
        let job = JobSpec::from_yaml(JOB).unwrap();
        assert_eq!(job.parameters.as_deref(), Some(&["year".to_string()][..]));
        let update = job.update.unwrap();
        assert_eq!(
            update.fields,
            vec![
                ("greeted".to_string(), "True".to_string()),
                ("visits".to_string(), "visits + 1".to_string()),
            ]
        );
        assert_eq!(job.insert[0].table, "Log");
        assert!(!job.to[0].semicolon_separated);
        assert!(job.cc.is_empty());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = JobSpec::from_yaml("query: q\nsubject: s\nbody: b\nreply_to: x\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn unknown_timezone_is_rejected() {
        let err = JobSpec::from_yaml("query: q\nsubject: s\nbody: b\ntimezone: Mars/Olympus\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownTimezone(ref tz) if tz == "Mars/Olympus"));
    }

    #[test]
    fn parameter_count_must_match() {
        let job = JobSpec::from_yaml(JOB).unwrap();
        let err = job.bind_parameters(&[]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::ParameterCount {
                required: 1,
                supplied: 0
            }
        ));
        let bound = job.bind_parameters(&["2020".to_string()]).unwrap();
        assert_eq!(bound, vec![("year".to_string(), Value::from("2020"))]);
    }

    #[test]
    fn no_declared_parameters_binds_nothing() {
        let job = JobSpec::from_yaml("query: q\nsubject: s\nbody: b\n").unwrap();
        assert!(job.bind_parameters(&["extra".to_string()]).unwrap().is_empty());
    }

    #[test]
    fn duplicate_parameters_are_rejected() {
        let err = JobSpec::from_yaml("parameters: [a, a]\nquery: q\nsubject: s\nbody: b\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn modes() {
        let dry = RunOptions {
            dry_run: true,
            ..Default::default()
        };
        assert!(dry.shows_previews() && !dry.sends_email() && !dry.writes_back());
        let no_email = RunOptions {
            no_email: true,
            ..Default::default()
        };
        assert!(!no_email.shows_previews() && !no_email.sends_email() && no_email.writes_back());
    }

    #[test]
    fn api_key_is_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key");
        std::fs::write(&path, "  secret\n").unwrap();
        assert_eq!(load_api_key(&path).unwrap().expose_secret(), "secret");
        std::fs::write(&path, "\n").unwrap();
        assert!(load_api_key(&path).is_err());
    }
}
