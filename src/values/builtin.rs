//! Built-in value types.

use super::cell::StateValue;
use crate::tag::Tag;
use serde::{Deserialize, Serialize};
use std::fmt;

impl StateValue for bool {
    const TYPE_NAME: &'static str = "Bool";
}

impl StateValue for i64 {
    const TYPE_NAME: &'static str = "Int";
}

impl StateValue for f64 {
    const TYPE_NAME: &'static str = "Float";
}

impl StateValue for String {
    const TYPE_NAME: &'static str = "String";
}

/// Short identifier value, distinct from free-form [`String`] state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Name(pub String);

impl Name {
    pub fn new(name: impl Into<String>) -> Self {
        Name(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl StateValue for Name {
    const TYPE_NAME: &'static str = "Name";
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector {
    pub const ZERO: Vector = Vector { x: 0.0, y: 0.0, z: 0.0 };
    pub const ONE: Vector = Vector { x: 1.0, y: 1.0, z: 1.0 };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

impl StateValue for Vector {
    const TYPE_NAME: &'static str = "Vector";
}

/// Orientation in degrees.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rotator {
    pub pitch: f64,
    pub yaw: f64,
    pub roll: f64,
}

impl Rotator {
    pub fn new(pitch: f64, yaw: f64, roll: f64) -> Self {
        Self { pitch, yaw, roll }
    }
}

impl StateValue for Rotator {
    const TYPE_NAME: &'static str = "Rotator";
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub location: Vector,
    pub rotation: Rotator,
    pub scale: Vector,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            location: Vector::ZERO,
            rotation: Rotator::default(),
            scale: Vector::ONE,
        }
    }
}

impl StateValue for Transform {
    const TYPE_NAME: &'static str = "Transform";
}

/// A state whose value is itself a tag (e.g. the current mode of an entity).
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagValue(pub Tag);

impl StateValue for TagValue {
    const TYPE_NAME: &'static str = "Tag";
}
