use serde::{Deserialize, Serialize};

/// What a diagnostic message is about. Each kind has one template per locale.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    ApplicationCreated,
    ApplicationUpdated,
    PipelineAttached,
    TriggerCreated,
    HookCreated,
    PollerCreated,
    PipelineNotFound,
    ApplicationNotFound,
    EnvironmentNotFound,
    /// Free-form, untranslated text.
    Text,
}

/// Languages messages can be rendered in.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Locale {
    #[default]
    En,
    Fr,
}

impl Locale {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Fr => "fr",
        }
    }

    /// Parses a single language tag such as `fr`, `fr-FR` or `en_US`.
    pub fn from_str(s: &str) -> Option<Self> {
        let primary = s
            .trim()
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match primary.as_str() {
            "en" => Some(Self::En),
            "fr" => Some(Self::Fr),
            _ => None,
        }
    }

    /// Picks the first supported language of an `Accept-Language` header.
    ///
    /// Tags are tried in the order the client listed them; quality values are
    /// ignored apart from `q=0`, which excludes the tag.
    pub fn from_accept_language(header: &str) -> Option<Self> {
        header.split(',').find_map(|part| {
            let mut pieces = part.split(';');
            let tag = pieces.next()?;
            let refused = pieces.any(|p| matches!(p.trim(), "q=0" | "q=0.0" | "q=0.00" | "q=0.000"));
            if refused {
                None
            } else {
                Self::from_str(tag)
            }
        })
    }
}

/// An immutable, localizable unit of feedback: a kind plus its parameters.
///
/// Two messages are considered duplicates when they render to the same text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    pub args: Vec<String>,
}

impl Message {
    pub fn new<I, S>(kind: MessageKind, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind,
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(MessageKind::Text, [text])
    }

    pub fn render(&self, locale: Locale) -> String {
        fill(template(self.kind, locale), &self.args)
    }
}

fn template(kind: MessageKind, locale: Locale) -> &'static str {
    use MessageKind::*;

    match (locale, kind) {
        (Locale::En, ApplicationCreated) => "Application {} created",
        (Locale::En, ApplicationUpdated) => "Application {} updated",
        (Locale::En, PipelineAttached) => "Pipeline {} attached to application {}",
        (Locale::En, TriggerCreated) => "Trigger from pipeline {} to pipeline {} created",
        (Locale::En, HookCreated) => "Hook created on repository {} for pipeline {}",
        (Locale::En, PollerCreated) => "Poller created on repository {} for pipeline {}",
        (Locale::En, PipelineNotFound) => "Pipeline {} not found",
        (Locale::En, ApplicationNotFound) => "Application {} not found",
        (Locale::En, EnvironmentNotFound) => "Environment {} not found",
        (Locale::Fr, ApplicationCreated) => "Application {} créée",
        (Locale::Fr, ApplicationUpdated) => "Application {} mise à jour",
        (Locale::Fr, PipelineAttached) => "Pipeline {} lié à l'application {}",
        (Locale::Fr, TriggerCreated) => "Déclencheur du pipeline {} vers le pipeline {} créé",
        (Locale::Fr, HookCreated) => "Hook créé sur le dépôt {} pour le pipeline {}",
        (Locale::Fr, PollerCreated) => "Poller créé sur le dépôt {} pour le pipeline {}",
        (Locale::Fr, PipelineNotFound) => "Pipeline {} introuvable",
        (Locale::Fr, ApplicationNotFound) => "Application {} introuvable",
        (Locale::Fr, EnvironmentNotFound) => "Environnement {} introuvable",
        (_, Text) => "{}",
    }
}

/// Substitutes `{}` placeholders in order. Missing arguments render empty.
fn fill(template: &str, args: &[String]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut args = args.iter();
    let mut rest = template;
    while let Some(pos) = rest.find("{}") {
        out.push_str(&rest[..pos]);
        if let Some(arg) = args.next() {
            out.push_str(arg);
        }
        rest = &rest[pos + 2..];
    }
    out.push_str(rest);
    out
}
