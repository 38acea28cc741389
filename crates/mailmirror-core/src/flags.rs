//! Flag codec.
//!
//! Only two flags are synchronized. Remote `\Seen` and `\Answered` map to
//! local `S` (seen) and `R` (replied); every other flag on either side is
//! ignored.

use mailmirror_imap::Flag as ImapFlag;

/// A synchronized flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Flag {
    /// Read.
    Seen,
    /// Answered.
    Replied,
}

impl Flag {
    /// Every synchronized flag.
    pub const ALL: [Self; 2] = [Self::Seen, Self::Replied];

    const fn bit(self) -> u8 {
        match self {
            Self::Seen => 0b01,
            Self::Replied => 0b10,
        }
    }

    /// Maildir info letter.
    #[must_use]
    pub const fn maildir_char(self) -> char {
        match self {
            Self::Seen => 'S',
            Self::Replied => 'R',
        }
    }

    /// IMAP system flag.
    #[must_use]
    pub const fn to_imap(self) -> ImapFlag {
        match self {
            Self::Seen => ImapFlag::Seen,
            Self::Replied => ImapFlag::Answered,
        }
    }
}

/// A set of synchronized flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FlagSet(u8);

impl FlagSet {
    /// The empty set.
    pub const EMPTY: Self = Self(0);

    /// Inserts a flag.
    pub const fn insert(&mut self, flag: Flag) {
        self.0 |= flag.bit();
    }

    /// Membership test.
    #[must_use]
    pub const fn contains(self, flag: Flag) -> bool {
        self.0 & flag.bit() != 0
    }

    /// True if no flag is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Set union.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Flags in `self` but not in `other`.
    #[must_use]
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// True if `self` contains every flag of `other` and at least one more.
    #[must_use]
    pub const fn is_strict_superset_of(self, other: Self) -> bool {
        self.0 != other.0 && self.0 & other.0 == other.0
    }

    /// Iterates the flags in a fixed order.
    pub fn iter(self) -> impl Iterator<Item = Flag> {
        Flag::ALL.into_iter().filter(move |f| self.contains(*f))
    }

    /// Decodes IMAP flags, dropping everything but `\Seen` and `\Answered`.
    pub fn from_imap<'a>(flags: impl IntoIterator<Item = &'a ImapFlag>) -> Self {
        flags
            .into_iter()
            .filter_map(|flag| match flag {
                ImapFlag::Seen => Some(Flag::Seen),
                ImapFlag::Answered => Some(Flag::Replied),
                _ => None,
            })
            .collect()
    }

    /// Encodes as IMAP flags.
    #[must_use]
    pub fn to_imap(self) -> Vec<ImapFlag> {
        self.iter().map(Flag::to_imap).collect()
    }

    /// Decodes maildir info letters, dropping unsynchronized ones.
    #[must_use]
    pub fn from_maildir(info: &str) -> Self {
        info.chars()
            .filter_map(|c| match c {
                'S' => Some(Flag::Seen),
                'R' => Some(Flag::Replied),
                _ => None,
            })
            .collect()
    }

    /// Encodes as maildir info letters.
    #[must_use]
    pub fn to_maildir(self) -> String {
        self.iter().map(Flag::maildir_char).collect()
    }
}

impl FromIterator<Flag> for FlagSet {
    fn from_iter<T: IntoIterator<Item = Flag>>(iter: T) -> Self {
        let mut set = Self::EMPTY;
        for flag in iter {
            set.insert(flag);
        }
        set
    }
}

/// Result of merging the two sides of one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagMerge {
    /// Union of both sides.
    pub merged: FlagSet,
    /// Write `merged` to the local message.
    pub update_local: bool,
    /// Flags the remote message lacks.
    pub add_remote: FlagSet,
}

/// Merges local and remote flags. Flags are only ever added.
#[must_use]
pub const fn merge(local: FlagSet, remote: FlagSet) -> FlagMerge {
    let merged = local.union(remote);
    FlagMerge {
        merged,
        update_local: merged.is_strict_superset_of(local),
        add_remote: merged.difference(remote),
    }
}
