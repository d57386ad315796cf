use serde::Deserialize;

use crate::ARGUMENT_KEY;

/// Additional command line arguments sent by the client as repeated query
/// parameters, in the order they appear in the url.
///
/// Other query parameters are ignored.
///
/// # Serialized Example
/// ```
/// # use rusty_stream_api::api::RequestArguments;
/// let args = RequestArguments::from_query("arg=AAA&other=1&arg=B+B%21").unwrap();
/// assert_eq!(args.as_slice(), ["AAA", "B B!"]);
/// ```
///
/// # Warning
/// The arguments are neither validated nor escaped.
/// A server running its command through a shell hands them to that shell verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "Vec<(String, String)>")]
pub struct RequestArguments(Vec<String>);

impl RequestArguments {
    /// Parses a raw, form-urlencoded query string (without the leading `?`).
    ///
    /// # Errors
    /// If the query is not valid form-urlencoding.
    pub fn from_query(query: &str) -> Result<Self, serde_urlencoded::de::Error> {
        serde_urlencoded::from_str(query)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<(String, String)>> for RequestArguments {
    fn from(pairs: Vec<(String, String)>) -> Self {
        Self(
            pairs
                .into_iter()
                .filter(|(key, _)| key == ARGUMENT_KEY)
                .map(|(_, value)| value)
                .collect(),
        )
    }
}
