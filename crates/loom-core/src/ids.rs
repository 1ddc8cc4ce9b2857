//! Branded ID newtypes for type safety.
//!
//! Every entity in Loom has a distinct ID type implemented as a newtype
//! wrapper around `String`, so a part ID can never be passed where a
//! message ID is expected.
//!
//! IDs are *ascending*: `<prefix>_<16 hex digits><14 random chars>`. The hex
//! section comes from a process-wide counter seeded by the millisecond clock,
//! so two IDs generated in sequence always compare in generation order, both
//! as strings and through [`Ord`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};

/// Length of the random suffix appended after the counter.
const RANDOM_LEN: usize = 14;

/// Last counter value handed out.
static LAST: AtomicU64 = AtomicU64::new(0);

/// Next strictly increasing counter value: `max(now_ms << 12, last + 1)`.
fn next_counter() -> u64 {
    let now = u64::try_from(crate::time::now_ms()).unwrap_or(0) << 12;
    let mut last = LAST.load(Ordering::Relaxed);
    loop {
        let next = now.max(last.saturating_add(1));
        match LAST.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

/// Generate an ascending ID string with the given prefix.
pub fn ascending(prefix: &str) -> String {
    let suffix: String = rand::rng()
        .sample_iter(Alphanumeric)
        .take(RANDOM_LEN)
        .map(char::from)
        .collect();
    format!("{prefix}_{:016x}{suffix}", next_counter())
}

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Prefix used for generated IDs of this kind.
            pub const PREFIX: &'static str = $prefix;

            /// Create a new ascending ID.
            #[must_use]
            pub fn new() -> Self {
                Self(ascending($prefix))
            }

            /// Create from an existing string value.
            #[must_use]
            pub fn from_string(s: String) -> Self {
                Self(s)
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

branded_id!(
    /// Identifies a session (root, subtask, or handoff target).
    SessionId,
    "ses"
);

branded_id!(
    /// Identifies a user or assistant message within a session.
    MessageId,
    "msg"
);

branded_id!(
    /// Identifies a part within a message.
    PartId,
    "prt"
);

branded_id!(
    /// Identifies a pending permission request.
    PermissionRequestId,
    "per"
);

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn ids_carry_prefix() {
        assert!(SessionId::new().starts_with("ses_"));
        assert!(MessageId::new().starts_with("msg_"));
        assert!(PartId::new().starts_with("prt_"));
        assert!(PermissionRequestId::new().starts_with("per_"));
    }

    #[test]
    fn id_length_is_fixed() {
        let id = PartId::new();
        assert_eq!(id.len(), "prt_".len() + 16 + RANDOM_LEN);
    }

    #[test]
    fn ids_are_strictly_ascending() {
        let ids: Vec<MessageId> = (0..1_000).map(|_| MessageId::new()).collect();
        for pair in ids.windows(2) {
            assert!(pair[0] < pair[1], "{} !< {}", pair[0], pair[1]);
            assert!(pair[0].as_str() < pair[1].as_str());
        }
    }

    #[test]
    fn ascending_across_threads() {
        let handles: Vec<_> = (0..4)
            .map(|_| std::thread::spawn(|| (0..250).map(|_| PartId::new()).collect::<Vec<_>>()))
            .collect();
        let mut all: Vec<PartId> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        let before = all.len();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), before);
    }

    #[test]
    fn serde_transparent() {
        let id = SessionId::from("ses_abc");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"ses_abc\"");
        let back: SessionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    proptest! {
        #[test]
        fn generated_batches_sort_in_generation_order(n in 2usize..64) {
            let ids: Vec<PartId> = (0..n).map(|_| PartId::new()).collect();
            let mut sorted = ids.clone();
            sorted.sort();
            prop_assert_eq!(ids, sorted);
        }
    }
}
