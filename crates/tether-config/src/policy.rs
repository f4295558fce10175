//! How handle-taking methods answer when the handle is no longer registered.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Reply convention for a request naming a handle with no live resource.
///
/// Existing controllers expect the benign form:
/// `false` for mutating methods and `null` for queries. Newer controllers can
/// opt into a distinct `resource-not-found` error so that "handle closed" is
/// distinguishable from "operation returned negative".
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum MissingHandlePolicy {
    /// Answer with the method's negative value (`false` or `null`).
    #[default]
    Benign,
    /// Answer with a `resource-not-found` error response.
    Error,
}

/// Errors encountered while parsing a [`MissingHandlePolicy`] from text.
pub type MissingHandlePolicyParseError = strum::ParseError;
