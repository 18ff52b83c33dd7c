// src/hydrate.rs
//! Template-driven hydration
//!
//! A reference document acts as a template: its scalars are type witnesses,
//! an empty container is an untyped passthrough, and a container whose only
//! entry sits at index 0 is the repeat unit of a list of records. Hydration
//! never fails on shape mismatches.

use crate::document::{Container, Document, Key, Number, Scalar};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HydrateMode {
    /// Reference fields missing from the input are copied with their default
    #[default]
    Hydrate,
    /// Reference fields missing from the input are omitted
    Populate,
}

/// Reconciles untyped input against a typed reference
///
/// ```
/// use docflow_core::{Document, Hydrator};
/// use serde_json::json;
///
/// let reference = Document::from(json!({"id": 0, "active": false, "tags": []}));
/// let input = Document::from(json!({"id": "42", "active": 1, "extra": true}));
/// let out = Hydrator::new().hydrate(&reference, &input);
/// assert_eq!(out.to_value(), json!({"id": 42, "active": true, "tags": []}));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Hydrator {
    mode: HydrateMode,
    coerce: bool,
}

impl Default for Hydrator {
    fn default() -> Self {
        Hydrator {
            mode: HydrateMode::Hydrate,
            coerce: true,
        }
    }
}

impl Hydrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(mut self, mode: HydrateMode) -> Self {
        self.mode = mode;
        self
    }

    /// Cast input scalars to the reference scalar's type (on by default)
    pub fn coerce(mut self, coerce: bool) -> Self {
        self.coerce = coerce;
        self
    }

    /// Produce a new document shaped by `reference` from the values of `input`
    pub fn hydrate(&self, reference: &Document, input: &Document) -> Document {
        log::debug!("hydrate: mode {:?}, coerce {}", self.mode, self.coerce);
        self.resolve(reference, input)
    }

    fn resolve(&self, reference: &Document, input: &Document) -> Document {
        match reference {
            Document::Container(template) if template.is_empty() => input.clone(),
            Document::Container(template) => match repeat_unit(template) {
                Some(unit) => Document::Container(self.expand(unit, input)),
                None => Document::Container(self.reconcile(template, input.as_container())),
            },
            Document::Scalar(witness) => match input {
                Document::Scalar(value) if self.coerce => Document::Scalar(cast(value, witness)),
                other => other.clone(),
            },
        }
    }

    fn reconcile(&self, reference: &Container, input: Option<&Container>) -> Container {
        let mut out = Container::new();
        for (key, template) in reference.iter() {
            match input.and_then(|c| c.get(key)) {
                Some(value) => {
                    out.insert(key.clone(), self.resolve(template, value));
                }
                None if self.mode == HydrateMode::Hydrate => {
                    out.insert(key.clone(), template.clone());
                }
                None => {}
            }
        }
        out
    }

    /// One hydrated record per input element; element keys are kept
    fn expand(&self, unit: &Document, input: &Document) -> Container {
        let elements = match input {
            Document::Container(elements) => elements,
            Document::Scalar(s) => {
                log::trace!("hydrate: {} where a list was expected", s.type_name());
                return Container::new();
            }
        };
        let mut out = Container::new();
        for (key, element) in elements.iter() {
            let template = unit.clone();
            out.insert(key.clone(), self.resolve(&template, element));
        }
        out
    }
}

fn repeat_unit(template: &Container) -> Option<&Document> {
    if template.len() == 1 {
        template.get(&Key::Index(0))
    } else {
        None
    }
}

/// Cast `value` to the runtime type of `witness`; a null witness leaves it as is
fn cast(value: &Scalar, witness: &Scalar) -> Scalar {
    match witness {
        Scalar::Null => value.clone(),
        Scalar::Bool(_) => Scalar::Bool(value.is_truthy()),
        Scalar::Int(_) => match value.as_number() {
            Some(Number::Int(i)) => Scalar::Int(i),
            Some(Number::Float(f)) => Scalar::Int(f as i64),
            None => Scalar::Int(0),
        },
        Scalar::Float(_) => Scalar::Float(value.as_number().map_or(0.0, Number::as_f64)),
        Scalar::String(_) => Scalar::String(value.to_text()),
    }
}
