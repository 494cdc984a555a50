use rand::RngCore;
use regex::Regex;
use tracing::trace;

use super::magazine::Magazine;

/// `${dotted.path}` references inside feature values. The path class also
/// accepts `[]` so array-literal keys stay addressable from templates.
const PLACEHOLDER_PATTERN: &str = r"\$\{([\w\.\-\[\]]+)\}";

/// Keys naming an array literal: a word character followed by `[]` at the
/// end of the key.
const ARRAY_KEY_PATTERN: &str = r"[\w\-]\[\]$";

/// Compiled patterns shared by the whole catalog build. Compiled once in
/// `Magazine::from_config` instead of living in process globals.
#[derive(Debug)]
pub(crate) struct Patterns {
    pub(crate) placeholder: Regex,
    pub(crate) array_key: Regex,
}

impl Patterns {
    pub(crate) fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            placeholder: Regex::new(PLACEHOLDER_PATTERN)?,
            array_key: Regex::new(ARRAY_KEY_PATTERN)?,
        })
    }
}

/// A named, possibly templated string value: a header, a body field or a
/// request path.
#[derive(Debug, Clone)]
pub struct Feature {
    name: String,
    kind: FeatureKind,
}

#[derive(Debug, Clone)]
enum FeatureKind {
    Simple(String),
    Templated {
        /// Literal text around the placeholders; always one segment more
        /// than `paths`.
        segments: Vec<String>,
        /// Placeholder paths in left-to-right extraction order.
        paths: Vec<String>,
    },
}

impl Feature {
    pub(crate) fn new(name: &str, raw: &str, placeholder: &Regex) -> Self {
        let mut segments = Vec::new();
        let mut paths = Vec::new();
        let mut cursor = 0usize;
        for capture in placeholder.captures_iter(raw) {
            let Some(full) = capture.get(0) else { continue };
            let Some(path) = capture.get(1) else { continue };
            segments.push(raw.get(cursor..full.start()).unwrap_or_default().to_owned());
            paths.push(path.as_str().to_owned());
            cursor = full.end();
        }
        if paths.is_empty() {
            return Self {
                name: name.to_owned(),
                kind: FeatureKind::Simple(raw.to_owned()),
            };
        }
        segments.push(raw.get(cursor..).unwrap_or_default().to_owned());
        Self {
            name: name.to_owned(),
            kind: FeatureKind::Templated { segments, paths },
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn is_templated(&self) -> bool {
        matches!(self.kind, FeatureKind::Templated { .. })
    }

    /// Produces the concrete string: placeholder positions are filled from
    /// the value tree through the worker's session cache; an unresolved
    /// path becomes an empty substitution.
    pub(crate) fn resolve(
        &self,
        magazine: &Magazine,
        session: &mut Option<usize>,
        rng: &mut dyn RngCore,
    ) -> String {
        match &self.kind {
            FeatureKind::Simple(value) => value.clone(),
            FeatureKind::Templated { segments, paths } => {
                let mut out = String::new();
                let mut literals = segments.iter();
                for path in paths {
                    if let Some(literal) = literals.next() {
                        out.push_str(literal);
                    }
                    match magazine.find_caliber(path, session, rng) {
                        Some(caliber) => out.push_str(&caliber.value_string()),
                        None => trace!("no value for placeholder '{}'", path),
                    }
                }
                if let Some(literal) = literals.next() {
                    out.push_str(literal);
                }
                out
            }
        }
    }
}
