//! Typed variable assignments exchanged with the optimization engine.

use std::collections::BTreeMap;

use nalgebra::Vector3;

use super::keys::VariableKey;
use crate::geometry::{OrientedPlane, SE3};
use crate::imu::ImuBias;
use crate::landmarks::{FrameId, LandmarkId, PlaneId};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Pose(SE3),
    Velocity(Vector3<f64>),
    Bias(ImuBias),
    Point(Vector3<f64>),
    Plane(OrientedPlane),
}

/// Ordered map from variable key to value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Values {
    entries: BTreeMap<VariableKey, Value>,
}

impl Values {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: VariableKey, value: Value) -> Option<Value> {
        self.entries.insert(key, value)
    }

    pub fn get(&self, key: &VariableKey) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn remove(&mut self, key: &VariableKey) -> Option<Value> {
        self.entries.remove(key)
    }

    pub fn contains(&self, key: &VariableKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &VariableKey> + '_ {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&VariableKey, &Value)> + '_ {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Overwrite entries with those of `other`.
    pub fn update_from(&mut self, other: &Values) {
        for (k, v) in other.iter() {
            self.entries.insert(*k, v.clone());
        }
    }

    pub fn pose(&self, frame: FrameId) -> Option<SE3> {
        match self.get(&VariableKey::Pose(frame)) {
            Some(Value::Pose(p)) => Some(*p),
            _ => None,
        }
    }

    pub fn velocity(&self, frame: FrameId) -> Option<Vector3<f64>> {
        match self.get(&VariableKey::Velocity(frame)) {
            Some(Value::Velocity(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn bias(&self, frame: FrameId) -> Option<ImuBias> {
        match self.get(&VariableKey::Bias(frame)) {
            Some(Value::Bias(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn point(&self, landmark: LandmarkId) -> Option<Vector3<f64>> {
        match self.get(&VariableKey::Landmark(landmark)) {
            Some(Value::Point(p)) => Some(*p),
            _ => None,
        }
    }

    pub fn plane(&self, plane: PlaneId) -> Option<OrientedPlane> {
        match self.get(&VariableKey::Plane(plane)) {
            Some(Value::Plane(p)) => Some(*p),
            _ => None,
        }
    }

    pub fn landmarks(&self) -> impl Iterator<Item = (LandmarkId, Vector3<f64>)> + '_ {
        self.entries.iter().filter_map(|(k, v)| match (k, v) {
            (VariableKey::Landmark(id), Value::Point(p)) => Some((*id, *p)),
            _ => None,
        })
    }

    pub fn planes(&self) -> impl Iterator<Item = (PlaneId, OrientedPlane)> + '_ {
        self.entries.iter().filter_map(|(k, v)| match (k, v) {
            (VariableKey::Plane(id), Value::Plane(p)) => Some((*id, *p)),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_getters() {
        let mut values = Values::new();
        values.insert(VariableKey::Pose(FrameId(1)), Value::Pose(SE3::identity()));
        values.insert(
            VariableKey::Landmark(LandmarkId(3)),
            Value::Point(Vector3::new(1.0, 2.0, 3.0)),
        );

        assert_eq!(values.pose(FrameId(1)), Some(SE3::identity()));
        assert_eq!(values.velocity(FrameId(1)), None);
        assert_eq!(values.point(LandmarkId(3)), Some(Vector3::new(1.0, 2.0, 3.0)));
        assert_eq!(values.landmarks().count(), 1);
    }

    #[test]
    fn test_update_from_overwrites() {
        let key = VariableKey::Velocity(FrameId(0));
        let mut a = Values::new();
        a.insert(key, Value::Velocity(Vector3::zeros()));
        let mut b = Values::new();
        b.insert(key, Value::Velocity(Vector3::x()));
        a.update_from(&b);
        assert_eq!(a.velocity(FrameId(0)), Some(Vector3::x()));
        assert_eq!(a.len(), 1);
    }
}
