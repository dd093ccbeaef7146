//! The four-axis capacity tuple and its saturating arithmetic.
//!
//! Subtraction clamps at zero on every axis; addition is checked and
//! reports which axis would have overflowed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// A capacity axis, used to report which dimension an admission
/// decision failed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Cpu,
    Memory,
    Ssd,
    Hdd,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Axis::Cpu => "cpu",
            Axis::Memory => "memory",
            Axis::Ssd => "ssd",
            Axis::Hdd => "hdd",
        };
        f.write_str(s)
    }
}

/// Node capacity: CPU thread count, memory bytes, SSD bytes, HDD bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capacity {
    pub cpu: u64,
    pub memory: u64,
    pub ssd: u64,
    pub hdd: u64,
}

impl Capacity {
    pub const ZERO: Capacity = Capacity { cpu: 0, memory: 0, ssd: 0, hdd: 0 };

    pub fn new(cpu: u64, memory: u64, ssd: u64, hdd: u64) -> Self {
        Self { cpu, memory, ssd, hdd }
    }

    /// Saturating componentwise addition.
    pub fn saturating_add(&self, other: &Capacity) -> Capacity {
        Capacity {
            cpu: self.cpu.saturating_add(other.cpu),
            memory: self.memory.saturating_add(other.memory),
            ssd: self.ssd.saturating_add(other.ssd),
            hdd: self.hdd.saturating_add(other.hdd),
        }
    }

    /// Saturating componentwise subtraction, clamped at zero.
    pub fn saturating_sub(&self, other: &Capacity) -> Capacity {
        Capacity {
            cpu: self.cpu.saturating_sub(other.cpu),
            memory: self.memory.saturating_sub(other.memory),
            ssd: self.ssd.saturating_sub(other.ssd),
            hdd: self.hdd.saturating_sub(other.hdd),
        }
    }

    /// Returns the first axis, in (cpu, memory, ssd, hdd) order, on
    /// which `self + other` would exceed `total`. `None` if all axes fit.
    pub fn first_exceeded_axis(&self, delta: &Capacity, total: &Capacity) -> Option<Axis> {
        if self.cpu.saturating_add(delta.cpu) > total.cpu {
            return Some(Axis::Cpu);
        }
        if self.memory.saturating_add(delta.memory) > total.memory {
            return Some(Axis::Memory);
        }
        if self.ssd.saturating_add(delta.ssd) > total.ssd {
            return Some(Axis::Ssd);
        }
        if self.hdd.saturating_add(delta.hdd) > total.hdd {
            return Some(Axis::Hdd);
        }
        None
    }
}

impl Add for Capacity {
    type Output = Capacity;
    fn add(self, rhs: Capacity) -> Capacity {
        self.saturating_add(&rhs)
    }
}

impl Sub for Capacity {
    type Output = Capacity;
    fn sub(self, rhs: Capacity) -> Capacity {
        self.saturating_sub(&rhs)
    }
}

/// Per-axis memory reserve for the host: `max(total.memory * 10%, 2 GiB)`.
pub const MEMORY_RESERVE_FLOOR: u64 = 2 * 1024 * 1024 * 1024;

pub fn system_reserved(total: &Capacity) -> Capacity {
    let memory = std::cmp::max(total.memory / 10, MEMORY_RESERVE_FLOOR);
    Capacity { cpu: 0, memory, ssd: 0, hdd: 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saturating_sub_clamps_at_zero() {
        let a = Capacity::new(1, 0, 0, 0);
        let b = Capacity::new(5, 5, 5, 5);
        assert_eq!(a.saturating_sub(&b), Capacity::ZERO);
    }

    #[test]
    fn saturating_add_never_panics_at_u64_max() {
        let a = Capacity::new(u64::MAX, u64::MAX, u64::MAX, u64::MAX);
        let b = Capacity::new(1, 1, 1, 1);
        assert_eq!(a.saturating_add(&b), a);
    }

    #[test]
    fn system_reserved_floor() {
        let total = Capacity::new(4, 4 * 1024 * 1024 * 1024, 0, 0);
        let reserved = system_reserved(&total);
        assert_eq!(reserved.memory, MEMORY_RESERVE_FLOOR);
    }

    #[test]
    fn system_reserved_percentage_above_floor() {
        let total = Capacity::new(4, 100 * 1024 * 1024 * 1024, 0, 0);
        let reserved = system_reserved(&total);
        assert_eq!(reserved.memory, 10 * 1024 * 1024 * 1024);
    }

    #[test]
    fn first_exceeded_axis_names_memory() {
        let total = Capacity::new(4, 8, 200, 0);
        let live = Capacity::ZERO;
        let delta = Capacity::new(4, 9, 1, 0);
        assert_eq!(live.first_exceeded_axis(&delta, &total), Some(Axis::Memory));
    }

    proptest::proptest! {
        #[test]
        fn saturating_sub_never_exceeds_operand(a in 0u64..u64::MAX, b in 0u64..u64::MAX) {
            let x = Capacity::new(a, a, a, a);
            let y = Capacity::new(b, b, b, b);
            let r = x.saturating_sub(&y);
            proptest::prop_assert!(r.cpu <= a);
        }
    }
}
