//! Outgoing message assembly and serialization.

use lettre::message::header::{self, Headers};
use lettre::message::{Mailbox, Mailboxes, SinglePart};

/// A fully rendered message for one row.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    pub subject: String,
    pub from: Option<Mailbox>,
    pub to: Vec<Mailbox>,
    pub cc: Vec<Mailbox>,
    pub bcc: Vec<Mailbox>,
    pub body: String,
}

fn mailboxes(list: &[Mailbox]) -> Mailboxes {
    list.iter().cloned().collect()
}

fn joined(list: &[Mailbox]) -> String {
    list.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl OutgoingMessage {
    /// RFC 5322 bytes for a header-routing transport.
    ///
    /// `Bcc` stays in the headers: `sendmail -t` reads recipients from it and
    /// strips it before delivery. Without `From` the transport supplies one.
    pub fn formatted(&self) -> Vec<u8> {
        let mut headers = Headers::new();
        headers.set(header::Subject::from(self.subject.clone()));
        if let Some(from) = &self.from {
            headers.set(header::From::from(Mailboxes::from(from.clone())));
        }
        if !self.to.is_empty() {
            headers.set(header::To::from(mailboxes(&self.to)));
        }
        if !self.cc.is_empty() {
            headers.set(header::Cc::from(mailboxes(&self.cc)));
        }
        if !self.bcc.is_empty() {
            headers.set(header::Bcc::from(mailboxes(&self.bcc)));
        }
        headers.set(header::Date::now());
        headers.set(header::MIME_VERSION_1_0);

        let mut out = headers.to_string().into_bytes();
        out.extend(SinglePart::plain(self.body.clone()).formatted());
        out
    }

    /// Human-readable preview block for dry runs and verbose mode.
    pub fn preview(&self) -> String {
        let mut out = format!("{}\nSubject: {}\n", "#".repeat(75), self.subject);
        for (label, list) in [("To", &self.to), ("Cc", &self.cc), ("Bcc", &self.bcc)] {
            if !list.is_empty() {
                out.push_str(&format!("{label}: {}\n", joined(list)));
            }
        }
        out.push_str(&"-".repeat(30));
        out.push('\n');
        out.push_str(&self.body);
        out.push('\n');
        out
    }
}
