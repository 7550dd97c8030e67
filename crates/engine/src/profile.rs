use std::fmt;

use serde::{Deserialize, Serialize};

/// The four classical elements, in tie-break priority order.
///
/// When two dimensions of a profile hold the same value, the element that
/// appears first in [`Element::ALL`] wins the argmax/argmin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Element {
    Fire,
    Water,
    Earth,
    Air,
}

impl Element {
    pub const ALL: [Element; 4] = [Self::Fire, Self::Water, Self::Earth, Self::Air];

    /// Canonical display label used in reasons and CLI output.
    pub fn label(self) -> &'static str {
        match self {
            Self::Fire => "Fire",
            Self::Water => "Water",
            Self::Earth => "Earth",
            Self::Air => "Air",
        }
    }

    /// Parse an element from its label (case-insensitive).
    pub fn from_label(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fire" => Some(Self::Fire),
            "water" => Some(Self::Water),
            "earth" => Some(Self::Earth),
            "air" => Some(Self::Air),
            _ => None,
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The four alchemical properties, in tie-break priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlchemicalProperty {
    Spirit,
    Essence,
    Matter,
    Substance,
}

impl AlchemicalProperty {
    pub const ALL: [AlchemicalProperty; 4] =
        [Self::Spirit, Self::Essence, Self::Matter, Self::Substance];

    pub fn label(self) -> &'static str {
        match self {
            Self::Spirit => "Spirit",
            Self::Essence => "Essence",
            Self::Matter => "Matter",
            Self::Substance => "Substance",
        }
    }
}

impl fmt::Display for AlchemicalProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Elemental composition of an item or a person.
///
/// Deserializes from PascalCase keys (`{"Fire": 0.4, "Water": 0.1}`).
/// Missing keys default to `0.0` and unknown keys are dropped, so callers
/// can hand over partial records without any re-normalization taking place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ElementalProfile {
    pub fire: f64,
    pub water: f64,
    pub earth: f64,
    pub air: f64,
}

impl ElementalProfile {
    pub fn new(fire: f64, water: f64, earth: f64, air: f64) -> Self {
        Self {
            fire,
            water,
            earth,
            air,
        }
    }

    /// An evenly split profile (0.25 per element).
    pub fn balanced() -> Self {
        Self::new(0.25, 0.25, 0.25, 0.25)
    }

    pub fn get(&self, element: Element) -> f64 {
        match element {
            Element::Fire => self.fire,
            Element::Water => self.water,
            Element::Earth => self.earth,
            Element::Air => self.air,
        }
    }

    pub fn set(&mut self, element: Element, value: f64) {
        match element {
            Element::Fire => self.fire = value,
            Element::Water => self.water = value,
            Element::Earth => self.earth = value,
            Element::Air => self.air = value,
        }
    }

    /// Dimensions in [`Element::ALL`] order.
    pub fn as_array(&self) -> [f64; 4] {
        [self.fire, self.water, self.earth, self.air]
    }

    pub fn total(&self) -> f64 {
        self.as_array().iter().sum()
    }

    /// Copy with negative or non-finite dimensions replaced by `0.0`.
    pub fn sanitized(&self) -> Self {
        let [fire, water, earth, air] = self.as_array().map(non_negative);
        Self::new(fire, water, earth, air)
    }

    /// Scale to proportions summing to 1.  An all-zero profile stays all-zero.
    pub fn normalized(&self) -> Self {
        let clean = self.sanitized();
        let total = clean.total();
        if total <= 0.0 {
            return Self::default();
        }
        let [fire, water, earth, air] = clean.as_array().map(|v| v / total);
        Self::new(fire, water, earth, air)
    }

    /// The strongest element; ties resolve in [`Element::ALL`] order.
    pub fn dominant_element(&self) -> Element {
        let values = self.sanitized().as_array();
        Element::ALL[argmax(&values)]
    }

    /// The weakest element; ties resolve in [`Element::ALL`] order.
    pub fn weakest_element(&self) -> Element {
        let values = self.sanitized().as_array();
        Element::ALL[argmin(&values)]
    }
}

/// Alchemical composition: Spirit, Essence, Matter, Substance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct AlchemicalProfile {
    pub spirit: f64,
    pub essence: f64,
    pub matter: f64,
    pub substance: f64,
}

impl AlchemicalProfile {
    pub fn new(spirit: f64, essence: f64, matter: f64, substance: f64) -> Self {
        Self {
            spirit,
            essence,
            matter,
            substance,
        }
    }

    pub fn get(&self, property: AlchemicalProperty) -> f64 {
        match property {
            AlchemicalProperty::Spirit => self.spirit,
            AlchemicalProperty::Essence => self.essence,
            AlchemicalProperty::Matter => self.matter,
            AlchemicalProperty::Substance => self.substance,
        }
    }

    pub fn as_array(&self) -> [f64; 4] {
        [self.spirit, self.essence, self.matter, self.substance]
    }

    pub fn total(&self) -> f64 {
        self.as_array().iter().sum()
    }

    pub fn sanitized(&self) -> Self {
        let [spirit, essence, matter, substance] = self.as_array().map(non_negative);
        Self::new(spirit, essence, matter, substance)
    }

    /// The strongest property; ties resolve in [`AlchemicalProperty::ALL`] order.
    pub fn dominant_property(&self) -> AlchemicalProperty {
        let values = self.sanitized().as_array();
        AlchemicalProperty::ALL[argmax(&values)]
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

// Strict comparisons keep the earliest index on ties.
fn argmax(values: &[f64; 4]) -> usize {
    let mut best = 0;
    for (idx, value) in values.iter().enumerate().skip(1) {
        if *value > values[best] {
            best = idx;
        }
    }
    best
}

fn argmin(values: &[f64; 4]) -> usize {
    let mut best = 0;
    for (idx, value) in values.iter().enumerate().skip(1) {
        if *value < values[best] {
            best = idx;
        }
    }
    best
}
