use std::fmt;

use itertools::Itertools;

/// A parameter.
///
/// This struct represents a parameter in a SIP message,
/// consisting of a name and an optional value.
///
/// # Examples
///
/// ```
/// # use sipecho::message::Param;
/// let param = Param { name: "expires", value: Some("3600") };
///
/// assert_eq!(param.to_string(), "expires=3600");
/// ```
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct Param<'a> {
    /// The parameter name.
    pub name: &'a str,
    /// The parameter value, if any.
    pub value: Option<&'a str>,
}

impl fmt::Display for Param<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Some(value) => write!(f, "{}={}", self.name, value),
            None => f.write_str(self.name),
        }
    }
}

/// A collection of [`Param`].
///
/// # Examples
///
/// ```
/// # use sipecho::message::Params;
/// let params = Params::from([("branch", "z9hG4bKnashds7"), ("maddr", "192.0.2.1")]);
///
/// assert_eq!(params.get("branch"), Some(Some("z9hG4bKnashds7")));
/// assert_eq!(params.to_string(), "branch=z9hG4bKnashds7;maddr=192.0.2.1");
/// ```
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct Params<'p>(Vec<Param<'p>>);

impl<'p> Params<'p> {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Params(Vec::new())
    }

    /// Creates an empty collection with the given capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Params(Vec::with_capacity(capacity))
    }

    /// Appends a parameter.
    pub fn push(&mut self, param: Param<'p>) {
        self.0.push(param);
    }

    /// Returns the value of the parameter named `name`.
    ///
    /// The outer `Option` is `None` when the parameter is absent, the
    /// inner one when it is present without a value.
    pub fn get(&self, name: &str) -> Option<Option<&'p str>> {
        self.0
            .iter()
            .find(|param| param.name.eq_ignore_ascii_case(name))
            .map(|param| param.value)
    }

    /// Removes the parameter named `name` and returns its value.
    ///
    /// The outer `Option` is `None` when the parameter is absent, the
    /// inner one when it is present without a value.
    pub fn take(&mut self, name: &str) -> Option<Option<&'p str>> {
        let idx = self.0.iter().position(|param| param.name.eq_ignore_ascii_case(name))?;

        Some(self.0.remove(idx).value)
    }

    /// Returns an iterator over the parameters.
    pub fn iter(&self) -> impl Iterator<Item = &Param<'p>> {
        self.0.iter()
    }

    /// Returns the number of parameters.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'p, const N: usize> From<[(&'p str, &'p str); N]> for Params<'p> {
    fn from(value: [(&'p str, &'p str); N]) -> Self {
        Params(
            value
                .into_iter()
                .map(|(name, value)| Param {
                    name,
                    value: Some(value),
                })
                .collect(),
        )
    }
}

impl fmt::Display for Params<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.iter().format(";"))
    }
}
