//! Message flags as they appear on the wire.

/// A single message flag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Flag {
    /// `\Seen`
    Seen,
    /// `\Answered`
    Answered,
    /// `\Flagged`
    Flagged,
    /// `\Deleted`
    Deleted,
    /// `\Draft`
    Draft,
    /// `\Recent`
    Recent,
    /// Keyword or any other flag the client does not interpret.
    Keyword(String),
}

impl Flag {
    /// Parses a flag atom. System flags match case-insensitively.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let Some(name) = s.strip_prefix('\\') else {
            return Self::Keyword(s.to_string());
        };
        [
            Self::Seen,
            Self::Answered,
            Self::Flagged,
            Self::Deleted,
            Self::Draft,
            Self::Recent,
        ]
        .into_iter()
        .find(|flag| flag.as_str()[1..].eq_ignore_ascii_case(name))
        .unwrap_or_else(|| Self::Keyword(s.to_string()))
    }

    /// Returns the wire form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Seen => "\\Seen",
            Self::Answered => "\\Answered",
            Self::Flagged => "\\Flagged",
            Self::Deleted => "\\Deleted",
            Self::Draft => "\\Draft",
            Self::Recent => "\\Recent",
            Self::Keyword(s) => s,
        }
    }
}

impl std::fmt::Display for Flag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ordered, duplicate-free flag list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Flags {
    flags: Vec<Flag>,
}

impl Flags {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a flag unless already present.
    pub fn insert(&mut self, flag: Flag) {
        if !self.flags.contains(&flag) {
            self.flags.push(flag);
        }
    }

    /// Returns true if the flag is present.
    #[must_use]
    pub fn contains(&self, flag: &Flag) -> bool {
        self.flags.contains(flag)
    }

    /// Iterates in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Flag> {
        self.flags.iter()
    }

    /// Number of flags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    /// True when no flag is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Formats as a parenthesized list, e.g. `(\Seen \Answered)`.
    #[must_use]
    pub fn to_list_string(&self) -> String {
        let names: Vec<&str> = self.flags.iter().map(Flag::as_str).collect();
        format!("({})", names.join(" "))
    }
}

impl FromIterator<Flag> for Flags {
    fn from_iter<T: IntoIterator<Item = Flag>>(iter: T) -> Self {
        let mut flags = Self::new();
        for flag in iter {
            flags.insert(flag);
        }
        flags
    }
}

impl IntoIterator for Flags {
    type Item = Flag;
    type IntoIter = std::vec::IntoIter<Flag>;

    fn into_iter(self) -> Self::IntoIter {
        self.flags.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod flag_tests {
        use super::*;

        #[test]
        fn system_flags_are_case_insensitive() {
            assert_eq!(Flag::parse("\\Seen"), Flag::Seen);
            assert_eq!(Flag::parse("\\SEEN"), Flag::Seen);
            assert_eq!(Flag::parse("\\answered"), Flag::Answered);
            assert_eq!(Flag::parse("\\Deleted"), Flag::Deleted);
        }

        #[test]
        fn unknown_flags_are_keywords() {
            assert_eq!(Flag::parse("$Junk"), Flag::Keyword("$Junk".to_string()));
            assert_eq!(
                Flag::parse("\\Important"),
                Flag::Keyword("\\Important".to_string())
            );
        }

        #[test]
        fn wire_form_round_trips() {
            for flag in [Flag::Seen, Flag::Answered, Flag::Draft, Flag::Recent] {
                assert_eq!(Flag::parse(flag.as_str()), flag);
            }
        }
    }

    mod flags_tests {
        use super::*;

        #[test]
        fn insert_deduplicates() {
            let flags: Flags = [Flag::Seen, Flag::Seen, Flag::Answered].into_iter().collect();
            assert_eq!(flags.len(), 2);
            assert!(flags.contains(&Flag::Answered));
        }

        #[test]
        fn list_string() {
            let flags: Flags = [Flag::Seen, Flag::Answered].into_iter().collect();
            assert_eq!(flags.to_list_string(), "(\\Seen \\Answered)");
            assert_eq!(Flags::new().to_list_string(), "()");
        }
    }
}
