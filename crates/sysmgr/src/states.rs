//! System state sets and the reader-facing state value.
//!
//! Applications declare their member set with [`system_states!`](crate::system_states).
//! The transient "transition in progress" value is not a member. Readers
//! observe it through [`SysState::TransitionInProgress`]; transition targets
//! are typed as members, so the sentinel cannot be requested as a target.

use core::fmt;
use core::hash::Hash;

/// A finite, ordered set of system states.
///
/// `index` must equal the position of the member in [`StateSet::ALL`]; the
/// [`system_states!`](crate::system_states) macro guarantees this.
pub trait StateSet: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    /// Every member, in index order.
    const ALL: &'static [Self];

    /// Number of members (`NB_STATES`).
    const COUNT: usize = Self::ALL.len();

    fn index(self) -> usize;

    /// Stable label used in logs and configuration files.
    fn name(self) -> &'static str;

    fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|state| state.name() == name)
    }
}

/// Declares a fieldless enum implementing [`StateSet`].
///
/// ```
/// sysmgr::system_states! {
///     pub enum PumpState {
///         Idle => "IDLE",
///         Priming => "PRIMING",
///         Running => "RUNNING",
///     }
/// }
///
/// use sysmgr::StateSet;
/// assert_eq!(PumpState::COUNT, 3);
/// assert_eq!(PumpState::from_name("PRIMING"), Some(PumpState::Priming));
/// ```
#[macro_export]
macro_rules! system_states {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident => $label:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $crate::StateSet for $name {
            const ALL: &'static [Self] = &[$(Self::$variant),+];

            fn index(self) -> usize {
                self as usize
            }

            fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $label),+
                }
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str($crate::StateSet::name(*self))
            }
        }
    };
}

system_states! {
    /// The member set used by the reference firmware.
    pub enum StandardState {
        /// There is no valid configuration.
        NoConf => "NO_CONF",
        /// A configuration is being written.
        Configuring => "CONFIGURING",
        /// The configuration is valid and applied.
        Configured => "CONFIGURED",
        /// Unrecoverable error; a reboot follows.
        FatalError => "FATAL_ERROR",
    }
}

/// Value observed by state readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SysState<S> {
    Stable(S),
    /// A transition is mid-flight; re-check later.
    TransitionInProgress,
}

impl<S: StateSet> SysState<S> {
    /// Returns the stable member, or `None` during a transition.
    pub fn stable(self) -> Option<S> {
        match self {
            Self::Stable(state) => Some(state),
            Self::TransitionInProgress => None,
        }
    }

    pub fn is(self, state: S) -> bool {
        self == Self::Stable(state)
    }

    pub fn is_transitioning(self) -> bool {
        matches!(self, Self::TransitionInProgress)
    }

    /// Raw encoding; the sentinel is the last-numbered value.
    pub fn to_raw(self) -> usize {
        match self {
            Self::Stable(state) => state.index(),
            Self::TransitionInProgress => S::COUNT,
        }
    }

    pub fn from_raw(raw: usize) -> Self {
        S::from_index(raw).map_or(Self::TransitionInProgress, Self::Stable)
    }
}

impl<S: StateSet> PartialEq<S> for SysState<S> {
    fn eq(&self, other: &S) -> bool {
        self.is(*other)
    }
}

impl<S: StateSet> fmt::Display for SysState<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stable(state) => f.write_str(state.name()),
            Self::TransitionInProgress => f.write_str("TRANSITION_IN_PROGRESS"),
        }
    }
}
