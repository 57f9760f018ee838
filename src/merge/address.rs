//! Address resolution: recipient descriptors → validated mailboxes.

use lettre::Address;
use lettre::message::Mailbox;

use crate::config::RecipientSpec;
use crate::error::{AddressError, Error};
use crate::merge::context::Context;
use crate::merge::template::{Template, TemplateEngine};

/// One recipient descriptor with its templates compiled.
#[derive(Debug, Clone)]
struct RecipientTemplate {
    name: Option<Template>,
    email: Template,
    semicolon_separated: bool,
}

/// A compiled `to`, `cc`, or `bcc` list.
#[derive(Debug, Clone)]
pub struct RecipientList {
    header: &'static str,
    entries: Vec<RecipientTemplate>,
}

impl RecipientList {
    /// Compile every template of `specs` into `engine`; `header` names the
    /// templates and labels errors (`to[1].name`).
    pub fn compile(
        header: &'static str,
        specs: &[RecipientSpec],
        engine: &mut TemplateEngine,
    ) -> Result<Self, Error> {
        let entries = specs
            .iter()
            .enumerate()
            .map(|(i, spec)| {
                let name = match spec.name.as_deref() {
                    Some(src) => {
                        let location = format!("{header}[{i}].name");
                        let template = Template::compile(engine, location.clone(), src)
                            .map_err(|e| Error::template(location, e))?;
                        Some(template)
                    }
                    None => None,
                };
                let location = format!("{header}[{i}].email");
                let email = Template::compile(engine, location.clone(), &spec.email)
                    .map_err(|e| Error::template(location, e))?;
                Ok(RecipientTemplate {
                    name,
                    email,
                    semicolon_separated: spec.semicolon_separated,
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;
        Ok(Self { header, entries })
    }

    /// Resolve against one row's context, flattened in declaration order.
    pub fn resolve(&self, context: &Context, engine: &TemplateEngine) -> Result<Vec<Mailbox>, Error> {
        let mut out = Vec::new();
        for (i, entry) in self.entries.iter().enumerate() {
            let mailboxes = entry.resolve(context, engine).map_err(|source| Error::Address {
                field: format!("{}[{i}]", self.header),
                source,
            })?;
            out.extend(mailboxes);
        }
        Ok(out)
    }
}

impl RecipientTemplate {
    fn resolve(&self, context: &Context, engine: &TemplateEngine) -> Result<Vec<Mailbox>, AddressError> {
        let email = self.email.render(context, engine)?;
        let name = self
            .name
            .as_ref()
            .map(|t| t.render(context, engine))
            .transpose()?;

        if !self.semicolon_separated {
            if email.is_empty() {
                return Ok(Vec::new());
            }
            return Ok(vec![mailbox(name.as_deref(), &email)?]);
        }

        let emails: Vec<&str> = email.split(';').map(str::trim).collect();
        let Some(name) = name else {
            return emails
                .into_iter()
                .filter(|e| !e.is_empty())
                .map(|e| mailbox(None, e))
                .collect();
        };

        let names: Vec<&str> = name.split(';').map(str::trim).collect();
        if names.len() != emails.len() {
            return Err(AddressError::CountMismatch {
                names: names.len(),
                emails: emails.len(),
            });
        }
        names
            .into_iter()
            .zip(emails)
            .filter(|(_, e)| !e.is_empty())
            .map(|(n, e)| mailbox(Some(n), e))
            .collect()
    }
}

/// Validate `email` and pair it with an optional display name.
fn mailbox(name: Option<&str>, email: &str) -> Result<Mailbox, AddressError> {
    let address: Address = email.parse().map_err(|e: lettre::address::AddressError| {
        AddressError::Invalid {
            address: email.to_string(),
            reason: e.to_string(),
        }
    })?;
    let name = name.filter(|n| !n.is_empty()).map(str::to_string);
    Ok(Mailbox::new(name, address))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TemplateError;
    use crate::expr::Value;

    fn spec(name: Option<&str>, email: &str, semicolon_separated: bool) -> RecipientSpec {
        RecipientSpec {
            name: name.map(str::to_string),
            email: email.to_string(),
            semicolon_separated,
        }
    }

    fn resolve(specs: &[RecipientSpec]) -> Result<Vec<String>, Error> {
        let ctx: Context = [
            ("who", Value::from("Ada")),
            ("mail", Value::from("ada@example.com")),
            ("blank", Value::from("")),
        ]
        .into_iter()
        .collect();
        let mut engine = TemplateEngine::new(None);
        let list = RecipientList::compile("to", specs, &mut engine)?;
        Ok(list
            .resolve(&ctx, &engine)?
            .iter()
            .map(ToString::to_string)
            .collect())
    }

    #[test]
    fn single_address_with_name() {
        let out = resolve(&[spec(Some("A"), "a@x.com", false)]).unwrap();
        assert_eq!(out, vec!["A <a@x.com>"]);
    }

    #[test]
    fn templated_address() {
        let out = resolve(&[spec(Some("{{ who }}"), "{{ mail }}", false)]).unwrap();
        assert_eq!(out, vec!["Ada <ada@example.com>"]);
    }

    #[test]
    fn semicolon_list_without_names() {
        let out = resolve(&[spec(None, "a@x.com;b@x.com", true)]).unwrap();
        assert_eq!(out, vec!["a@x.com", "b@x.com"]);
    }

    #[test]
    fn semicolon_list_pairs_names_and_drops_empty_emails() {
        let out = resolve(&[spec(Some("A; B; C"), "a@x.com; ;c@x.com", true)]).unwrap();
        assert_eq!(out, vec!["A <a@x.com>", "C <c@x.com>"]);
    }

    #[test]
    fn semicolon_count_mismatch_fails() {
        let err = resolve(&[spec(Some("A;B"), "a@x.com", true)]).unwrap_err();
        assert!(matches!(
            err,
            Error::Address {
                source: AddressError::CountMismatch { names: 2, emails: 1 },
                ..
            }
        ));
    }

    #[test]
    fn empty_email_is_dropped() {
        let out = resolve(&[spec(Some("{{ who }}"), "{{ blank }}", false)]).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn invalid_address_fails() {
        let err = resolve(&[spec(None, "not-an-address", false)]).unwrap_err();
        assert!(matches!(
            err,
            Error::Address {
                source: AddressError::Invalid { .. },
                ..
            }
        ));
    }

    #[test]
    fn lists_flatten_in_order() {
        let out = resolve(&[
            spec(None, "b@x.com", false),
            spec(None, "a@x.com;c@x.com", true),
        ])
        .unwrap();
        assert_eq!(out, vec!["b@x.com", "a@x.com", "c@x.com"]);
    }

    #[test]
    fn syntax_errors_name_the_template() {
        let err = resolve(&[spec(Some("{{ who"), "a@x.com", false)]).unwrap_err();
        assert!(matches!(
            err,
            Error::Template { ref template, source: TemplateError::Syntax(_) } if template == "to[0].name"
        ));
    }

    #[test]
    fn undefined_names_fail_with_location() {
        let err = resolve(&[spec(None, "a@x.com", false), spec(None, "{{ nobody }}", false)])
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Address { ref field, source: AddressError::Template(TemplateError::Undefined(_)) }
                if field == "to[1]"
        ));
    }
}
