//! Internal state of the simulated controller.
//!
//! Everything here is plain data. The dispatcher mutates it, and test harnesses are free to
//! read or preset any field before sending commands.

use std::collections::BTreeMap;

// Positions of every axis that has been addressed so far, grouped by module.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AxisTable {
    modules: BTreeMap<char, BTreeMap<char, i64>>,
}

impl AxisTable {
    /// Returns a mutable handle to an axis position, creating the entry at 0 if needed.
    pub fn position_mut(&mut self, module: char, axis: char) -> &mut i64 {
        self.modules
            .entry(module)
            .or_default()
            .entry(axis)
            .or_insert(0)
    }

    /// Reads an axis position without creating it. Unknown axes report 0.
    pub fn position(&self, module: char, axis: char) -> i64 {
        self.modules
            .get(&module)
            .and_then(|axes| axes.get(&axis))
            .copied()
            .unwrap_or(0)
    }

    /// Overwrites an axis position.
    pub fn set(&mut self, module: char, axis: char, value: i64) {
        *self.position_mut(module, axis) = value;
    }

    /// Moves an axis back to 0.
    pub fn home(&mut self, module: char, axis: char) {
        self.set(module, axis, 0);
    }

    /// True if the axis has been addressed at least once.
    pub fn contains(&self, module: char, axis: char) -> bool {
        self.modules
            .get(&module)
            .is_some_and(|axes| axes.contains_key(&axis))
    }

    /// Iterates over `(module, axis, position)` in module then axis order.
    pub fn iter(&self) -> impl Iterator<Item = (char, char, i64)> + '_ {
        self.modules.iter().flat_map(|(&module, axes)| {
            axes.iter().map(move |(&axis, &position)| (module, axis, position))
        })
    }

    pub fn len(&self) -> usize {
        self.modules.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// Binary and analog peripherals. The photodiode is only ever written by the harness.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ActuatorState {
    pub shutter_open: bool,
    pub led1_on: bool,
    pub led2_on: bool,
    pub photodiode: i64,
}

impl ActuatorState {
    /// Switches both LED channels together.
    pub fn set_leds(&mut self, on: bool) {
        self.led1_on = on;
        self.led2_on = on;
    }
}

// The complete state of one simulated controller.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeviceState {
    pub axes: AxisTable,
    pub actuators: ActuatorState,
}
