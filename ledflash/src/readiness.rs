//! Flash readiness gate.
//!
//! Four independent preconditions must hold before a flash may start. They
//! are set from different threads (port watcher, toolchain preparation, the
//! pipeline itself) so they live in atomics; [`Readiness`] is a plain copy
//! used for the actual decision.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// A precondition that blocks flashing, in reporting priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Unmet {
    /// No serial port is selected.
    PortSelected,
    /// The toolchain core is not installed yet.
    CoreInstalled,
    /// The required libraries are not installed yet.
    LibrariesInstalled,
    /// Another flash is in progress.
    NotFlashing,
}

impl Unmet {
    /// Message shown to the user.
    pub fn message(self) -> &'static str {
        match self {
            Self::PortSelected => "No port selected",
            Self::CoreInstalled => "Arduino core still installing",
            Self::LibrariesInstalled => "Arduino libraries still installing",
            Self::NotFlashing => "Flash already in progress",
        }
    }
}

impl fmt::Display for Unmet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Snapshot of the four flash preconditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct Readiness {
    /// A serial port is selected.
    pub port_selected: bool,
    /// The toolchain core is installed.
    pub core_installed: bool,
    /// The required libraries are installed.
    pub libraries_installed: bool,
    /// No flash is running.
    pub not_flashing: bool,
}

impl Readiness {
    /// True iff every precondition holds.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.first_unmet().is_none()
    }

    /// The highest-priority precondition that does not hold.
    #[must_use]
    pub fn first_unmet(&self) -> Option<Unmet> {
        if !self.port_selected {
            Some(Unmet::PortSelected)
        } else if !self.core_installed {
            Some(Unmet::CoreInstalled)
        } else if !self.libraries_installed {
            Some(Unmet::LibrariesInstalled)
        } else if !self.not_flashing {
            Some(Unmet::NotFlashing)
        } else {
            None
        }
    }
}

/// Shared, thread-safe readiness flags.
#[derive(Debug)]
pub struct ReadyState {
    port_selected: AtomicBool,
    core_installed: AtomicBool,
    libraries_installed: AtomicBool,
    not_flashing: AtomicBool,
}

impl Default for ReadyState {
    fn default() -> Self {
        Self {
            port_selected: AtomicBool::new(false),
            core_installed: AtomicBool::new(false),
            libraries_installed: AtomicBool::new(false),
            not_flashing: AtomicBool::new(true),
        }
    }
}

impl ReadyState {
    /// Read all four flags.
    pub fn snapshot(&self) -> Readiness {
        Readiness {
            port_selected: self.port_selected.load(Ordering::Acquire),
            core_installed: self.core_installed.load(Ordering::Acquire),
            libraries_installed: self.libraries_installed.load(Ordering::Acquire),
            not_flashing: self.not_flashing.load(Ordering::Acquire),
        }
    }

    /// Published by the port watcher.
    pub fn set_port_selected(&self, value: bool) {
        self.port_selected.store(value, Ordering::Release);
    }

    /// Published once the toolchain core is installed.
    pub fn set_core_installed(&self, value: bool) {
        self.core_installed.store(value, Ordering::Release);
    }

    /// Published once the required libraries are installed.
    pub fn set_libraries_installed(&self, value: bool) {
        self.libraries_installed.store(value, Ordering::Release);
    }

    /// Check every precondition and claim the single flash slot.
    ///
    /// The slot is released when the returned guard is dropped.
    pub fn try_begin_flash(&self) -> Result<FlashGuard<'_>, Unmet> {
        if let Some(unmet) = self.snapshot().first_unmet() {
            return Err(unmet);
        }
        self.not_flashing
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Unmet::NotFlashing)?;
        Ok(FlashGuard { state: self })
    }
}

/// Holds the flash slot; releases it on drop.
#[derive(Debug)]
pub struct FlashGuard<'a> {
    state: &'a ReadyState,
}

impl Drop for FlashGuard<'_> {
    fn drop(&mut self) {
        self.state
            .not_flashing
            .store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn readiness(bits: u8) -> Readiness {
        Readiness {
            port_selected: bits & 0b0001 != 0,
            core_installed: bits & 0b0010 != 0,
            libraries_installed: bits & 0b0100 != 0,
            not_flashing: bits & 0b1000 != 0,
        }
    }

    #[test]
    fn test_is_ready_truth_table() {
        for bits in 0u8..16 {
            assert_eq!(readiness(bits).is_ready(), bits == 0b1111, "flags {bits:04b}");
        }
    }

    #[test]
    fn test_first_unmet_follows_priority_order() {
        for bits in 0u8..16 {
            let expected = if bits & 0b0001 == 0 {
                Some(Unmet::PortSelected)
            } else if bits & 0b0010 == 0 {
                Some(Unmet::CoreInstalled)
            } else if bits & 0b0100 == 0 {
                Some(Unmet::LibrariesInstalled)
            } else if bits & 0b1000 == 0 {
                Some(Unmet::NotFlashing)
            } else {
                None
            };
            assert_eq!(readiness(bits).first_unmet(), expected, "flags {bits:04b}");
        }
    }

    #[test]
    fn test_default_state_is_only_not_flashing() {
        let state = ReadyState::default();
        assert_eq!(state.snapshot(), readiness(0b1000));
        assert_eq!(state.try_begin_flash().unwrap_err(), Unmet::PortSelected);
    }

    #[test]
    fn test_flash_guard_is_single_flight() {
        let state = ReadyState::default();
        state.set_port_selected(true);
        state.set_core_installed(true);
        state.set_libraries_installed(true);

        let guard = state.try_begin_flash().unwrap();
        assert!(!state.snapshot().not_flashing);
        assert_eq!(state.try_begin_flash().unwrap_err(), Unmet::NotFlashing);

        drop(guard);
        assert!(state.snapshot().is_ready());
        assert!(state.try_begin_flash().is_ok());
    }

    #[test]
    fn test_unmet_messages() {
        assert_eq!(Unmet::PortSelected.to_string(), "No port selected");
        assert_eq!(Unmet::CoreInstalled.to_string(), "Arduino core still installing");
        assert_eq!(
            Unmet::LibrariesInstalled.to_string(),
            "Arduino libraries still installing"
        );
    }
}
