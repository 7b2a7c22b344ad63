//! Ordered rule table mapping log lines to stream events.
//!
//! Each rule pairs a regex with an extractor. Rules are tried in priority
//! order (created, destroyed, publishing) and the first whose regex matches
//! decides the event. If its extractor cannot build one, the line is
//! [`StreamEvent::NoMatch`], as is any line no rule matches.

use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Typed lifecycle event derived from one log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A stream path was created on the media server.
    StreamCreated {
        /// Stream path, e.g. `live/cam1`.
        path: String,
    },
    /// A stream path was destroyed on the media server.
    StreamDestroyed {
        /// Stream path, e.g. `live/cam1`.
        path: String,
    },
    /// A client began publishing media to a path.
    PublishingDetected {
        /// Stream path, e.g. `live/cam1`.
        path: String,
        /// Number of tracks the publisher declared.
        track_count: u32,
        /// Codec names in announcement order (video first).
        codecs: Vec<String>,
    },
    /// The line carries no lifecycle information.
    NoMatch,
}

impl StreamEvent {
    /// Stream path carried by the event, if any.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::StreamCreated { path }
            | Self::StreamDestroyed { path }
            | Self::PublishingDetected { path, .. } => Some(path),
            Self::NoMatch => None,
        }
    }

    /// Kind of event, independent of its payload.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::StreamCreated { .. } => EventKind::Created,
            Self::StreamDestroyed { .. } => EventKind::Destroyed,
            Self::PublishingDetected { .. } => EventKind::Publishing,
            Self::NoMatch => EventKind::NoMatch,
        }
    }
}

impl std::fmt::Display for StreamEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StreamCreated { path } => write!(f, "created {path}"),
            Self::StreamDestroyed { path } => write!(f, "destroyed {path}"),
            Self::PublishingDetected {
                path,
                track_count,
                codecs,
            } => write!(
                f,
                "publishing {path} ({track_count} tracks: {})",
                codecs.join(", ")
            ),
            Self::NoMatch => write!(f, "no match"),
        }
    }
}

/// Payload-free event discriminant, used to label rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Created,
    Destroyed,
    Publishing,
    NoMatch,
}

/// Error type for classifier construction.
#[derive(thiserror::Error, Debug)]
pub enum ClassifierError {
    /// Invalid regex pattern.
    #[error("Invalid regex pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Builds an event from the capture groups of a matched rule.
pub type Extractor = fn(&Captures<'_>) -> Option<StreamEvent>;

/// A single classification rule.
#[derive(Debug, Clone)]
pub struct EventRule {
    kind: EventKind,
    pattern: Regex,
    extract: Extractor,
}

impl EventRule {
    /// Create a new rule.
    ///
    /// # Errors
    ///
    /// Returns `ClassifierError::InvalidPattern` if the regex is invalid.
    pub fn new(
        kind: EventKind,
        pattern: &str,
        extract: Extractor,
    ) -> Result<Self, ClassifierError> {
        Ok(Self {
            kind,
            pattern: Regex::new(pattern)?,
            extract,
        })
    }

    /// Try to turn `line` into an event.
    ///
    /// Returns `None` if the pattern does not match. A match whose captures
    /// cannot be extracted gives `Some(StreamEvent::NoMatch)`.
    #[must_use]
    pub fn apply(&self, line: &str) -> Option<StreamEvent> {
        let caps = self.pattern.captures(line)?;
        Some((self.extract)(&caps).unwrap_or(StreamEvent::NoMatch))
    }

    /// Get the kind of event this rule produces.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Get the pattern string (for debugging/display).
    #[must_use]
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }
}

/// Ordered collection of classification rules.
#[derive(Debug, Clone, Default)]
pub struct EventClassifier {
    rules: Vec<EventRule>,
}

impl EventClassifier {
    /// Create a classifier with no rules. Every line is `NoMatch`.
    #[must_use]
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Create a classifier for the media server's log format.
    #[must_use]
    pub fn with_default_rules() -> Self {
        let rules = Self::default_rules()
            .into_iter()
            .filter_map(|result| match result {
                Ok(rule) => Some(rule),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to compile default event rule");
                    None
                }
            })
            .collect();
        Self { rules }
    }

    /// Append a rule. It is tried after all existing rules.
    pub fn add_rule(&mut self, rule: EventRule) {
        self.rules.push(rule);
    }

    /// Classify a line. The first rule whose pattern matches decides.
    #[must_use]
    pub fn classify(&self, line: &str) -> StreamEvent {
        self.rules
            .iter()
            .find_map(|rule| rule.apply(line))
            .unwrap_or(StreamEvent::NoMatch)
    }

    /// Get all rules in priority order.
    #[must_use]
    pub fn rules(&self) -> &[EventRule] {
        &self.rules
    }

    fn default_rules() -> Vec<Result<EventRule, ClassifierError>> {
        vec![
            EventRule::new(
                EventKind::Created,
                r"\[path (live/[^\]]+)\] created",
                extract_created,
            ),
            EventRule::new(
                EventKind::Destroyed,
                r"\[path (live/[^\]]+)\] destroyed",
                extract_destroyed,
            ),
            EventRule::new(
                EventKind::Publishing,
                r"is publishing to path '([^']+)', (\d+) tracks? \(([^)]+)\)",
                extract_publishing,
            ),
        ]
    }
}

static DEFAULT_CLASSIFIER: LazyLock<EventClassifier> =
    LazyLock::new(EventClassifier::with_default_rules);

/// Classify a line with the default media server rules.
#[must_use]
pub fn classify(line: &str) -> StreamEvent {
    DEFAULT_CLASSIFIER.classify(line)
}

fn capture(caps: &Captures<'_>, index: usize) -> Option<String> {
    caps.get(index).map(|m| m.as_str().to_string())
}

fn extract_created(caps: &Captures<'_>) -> Option<StreamEvent> {
    Some(StreamEvent::StreamCreated {
        path: capture(caps, 1)?,
    })
}

fn extract_destroyed(caps: &Captures<'_>) -> Option<StreamEvent> {
    Some(StreamEvent::StreamDestroyed {
        path: capture(caps, 1)?,
    })
}

fn extract_publishing(caps: &Captures<'_>) -> Option<StreamEvent> {
    let path = capture(caps, 1)?;
    let track_count = caps.get(2)?.as_str().parse().ok()?;
    let codecs = caps
        .get(3)?
        .as_str()
        .split(", ")
        .map(|codec| codec.trim().to_string())
        .collect();

    Some(StreamEvent::PublishingDetected {
        path,
        track_count,
        codecs,
    })
}
