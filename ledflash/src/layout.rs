//! Custom LED layouts.
//!
//! A custom build replaces the firmware's `layout.h` with the segment sizes
//! entered by the user. Layouts are validated before anything is generated:
//! a navigation light count larger than the wing string it lives on is
//! rejected rather than silently clamped.

use crate::error::{Error, Result};

/// Name of the generated header inside the sketch folder.
pub const LAYOUT_HEADER: &str = "layout.h";

/// Largest count the firmware inputs accept (two decimal digits).
pub const MAX_SEGMENT_LEDS: u8 = 99;

/// LED counts and wiring of one airframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct CustomLayout {
    /// Total wing LEDs.
    pub wing_leds: u8,
    /// Total nose LEDs.
    pub nose_leds: u8,
    /// Total fuselage LEDs.
    pub fuse_leds: u8,
    /// Total tail LEDs.
    pub tail_leds: u8,
    /// Wing LEDs used as navigation lights.
    pub wing_nav_leds: u8,

    /// Wing string reversed.
    pub wing_rev: bool,
    /// Nose string reversed.
    pub nose_rev: bool,
    /// Fuselage string reversed.
    pub fuse_rev: bool,
    /// Tail string reversed.
    pub tail_rev: bool,

    /// Nose and fuselage strings are one physical string.
    pub nose_fuse_join: bool,
}

impl Default for CustomLayout {
    fn default() -> Self {
        Self {
            wing_leds: 31,
            nose_leds: 4,
            fuse_leds: 18,
            tail_leds: 8,
            wing_nav_leds: 8,

            wing_rev: false,
            nose_rev: true,
            fuse_rev: false,
            tail_rev: false,

            nose_fuse_join: true,
        }
    }
}

impl CustomLayout {
    /// Check the layout invariants.
    pub fn validate(&self) -> Result<()> {
        for (name, count) in [
            ("wing", self.wing_leds),
            ("nose", self.nose_leds),
            ("fuse", self.fuse_leds),
            ("tail", self.tail_leds),
            ("navigation", self.wing_nav_leds),
        ] {
            if count > MAX_SEGMENT_LEDS {
                return Err(Error::InvalidLayout(format!(
                    "{count} {name} LEDs exceeds the maximum of {MAX_SEGMENT_LEDS}"
                )));
            }
        }

        if self.wing_nav_leds > self.wing_leds {
            return Err(Error::InvalidLayout(format!(
                "{} navigation LEDs do not fit on a wing string of {}",
                self.wing_nav_leds, self.wing_leds
            )));
        }
        Ok(())
    }

    /// Validate and render `layout.h`.
    pub fn generate(&self) -> Result<String> {
        self.validate()?;
        Ok(self.render())
    }

    /// Render `layout.h` without validation.
    pub fn render(&self) -> String {
        format!(
            "#pragma once\n\
             \n\
             // Layout: -- Custom --\n\
             \n\
             // number of LEDs in specific strings\n\
             #define WING_LEDS {} // total wing LEDs\n\
             #define NOSE_LEDS {} // total nose LEDs\n\
             #define FUSE_LEDS {} // total fuselage LEDs\n\
             #define TAIL_LEDS {} // total tail LEDs\n\
             \n\
             // strings reversed?\n\
             #define WING_REV {}\n\
             #define NOSE_REV {}\n\
             #define FUSE_REV {}\n\
             #define TAIL_REV {}\n\
             \n\
             #define NOSE_FUSE_JOINED {} // are the nose and fuse strings joined?\n\
             #define WING_NAV_LEDS {} // wing LEDs that are navlights\n\
             \n\
             #define LED_POWER 25\n",
            self.wing_leds,
            self.nose_leds,
            self.fuse_leds,
            self.tail_leds,
            self.wing_rev,
            self.nose_rev,
            self.fuse_rev,
            self.tail_rev,
            self.nose_fuse_join,
            self.wing_nav_leds,
        )
    }
}
