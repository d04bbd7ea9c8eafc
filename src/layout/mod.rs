// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Geometry and layout solution data model.
//!
//! A [`LayoutSolution`] describes how the composite canvas is tiled at any
//! moment: an ordered list of [`LayoutEntry`] items mapping an input slot to
//! a fractional [`Region`] of the canvas. Later entries paint over earlier
//! ones, so the order doubles as the Z-order for overlapping regions.
//!
//! Solutions arrive from the signalling layer, which is why the whole model
//! derives [`serde::Serialize`] and [`serde::Deserialize`].

use serde::{Deserialize, Serialize};

/// Cartesian pixel dimension
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    /// horizontal dimension
    pub width: u32,
    /// vertical dimension
    pub height: u32,
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl Size {
    /// SD (Standard Definition)
    pub const SD: Self = Self {
        width: 640,
        height: 480,
    };
    /// HD (High Definition)
    pub const HD: Self = Self {
        width: 1280,
        height: 720,
    };
    /// Full HD (FHD)
    pub const FHD: Self = Self {
        width: 1920,
        height: 1080,
    };

    /// return ratio between width and height
    #[must_use]
    pub fn ratio(&self) -> f64 {
        f64::from(self.width) / f64::from(self.height)
    }
}

/// Fraction of the composite canvas along one axis.
///
/// The denominator must be greater than zero. Pixel projection multiplies
/// the canvas extent by `numerator / denominator` in 64 bit to avoid
/// overflow on large canvases.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rational {
    pub numerator: u32,
    pub denominator: u32,
}

impl Rational {
    /// 0/1
    pub const ZERO: Self = Self {
        numerator: 0,
        denominator: 1,
    };
    /// 1/1
    pub const ONE: Self = Self {
        numerator: 1,
        denominator: 1,
    };

    #[must_use]
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Project this fraction onto a pixel extent.
    #[must_use]
    pub fn of(&self, extent: u32) -> u32 {
        (u64::from(extent) * u64::from(self.numerator) / u64::from(self.denominator)) as u32
    }
}

impl std::fmt::Display for Rational {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Fractional rectangle on the composite canvas.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub left: Rational,
    pub top: Rational,
    pub width: Rational,
    pub height: Rational,
}

impl Rect {
    /// The whole canvas.
    pub const FULL: Self = Self {
        left: Rational::ZERO,
        top: Rational::ZERO,
        width: Rational::ONE,
        height: Rational::ONE,
    };
}

/// Placement area of one region.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Area {
    pub rect: Rect,
}

/// Region of the canvas an input is placed into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub area: Area,
}

impl Region {
    #[must_use]
    pub const fn new(rect: Rect) -> Self {
        Self {
            area: Area { rect },
        }
    }
}

/// One input placed into one region.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutEntry {
    /// Input slot index, must be below the compositor's `max_input`.
    pub input: usize,
    pub region: Region,
}

/// Ordered sequence of layout entries. Later entries paint over earlier ones.
pub type LayoutSolution = Vec<LayoutEntry>;
