use crate::nes::snapshot::{Snapshot, Snapshotable};

const ENV_LOOP: u8 = 0b0010_0000;
const ENV_CONST: u8 = 0b0001_0000;
const ENV_VOLUME: u8 = 0b0000_1111;

#[inline]
fn env_volume(v: u8) -> u8 {
    v & ENV_VOLUME
}
#[inline]
fn env_loop(v: u8) -> bool {
    (v & ENV_LOOP) != 0
}
#[inline]
fn env_const(v: u8) -> bool {
    (v & ENV_CONST) != 0
}

#[derive(Debug, Clone)]
pub struct Envelope {
    start: bool,
    divider: u8,
    decay: u8,
    constant_volume: u8,
    loop_flag: bool,
    volume_mode: VolumeMode,
    period: u8,
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum VolumeMode {
    Envelope,
    Constant,
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new()
    }
}

impl Envelope {
    pub fn new() -> Envelope {
        Envelope {
            start: false,
            divider: 0,
            decay: 0,
            constant_volume: 0,
            loop_flag: false,
            volume_mode: VolumeMode::Envelope,
            period: 0,
        }
    }

    /// Called with value in this shape: --LC_VVVV
    pub fn set(&mut self, value: u8) {
        let v = env_volume(value);
        self.period = v;
        self.constant_volume = v;

        self.volume_mode = if env_const(value) {
            VolumeMode::Constant
        } else {
            VolumeMode::Envelope
        };

        self.loop_flag = env_loop(value);
    }

    /// Called by the quarter-frame clock
    pub fn clock(&mut self) {
        // A pending start reloads and waits for the next clock to advance
        if self.start {
            self.start = false;
            self.decay = 15;
            self.divider = self.period;
            return;
        }

        if self.divider == 0 {
            self.divider = self.period;
            if self.decay > 0 {
                self.decay -= 1;
            } else if self.loop_flag {
                self.decay = 15;
            }
        } else {
            self.divider -= 1;
        }
    }

    pub fn set_start_flag(&mut self, start: bool) {
        self.start = start;
    }

    pub fn output(&self) -> u8 {
        match self.volume_mode {
            VolumeMode::Envelope => self.decay,
            VolumeMode::Constant => self.constant_volume,
        }
    }
}

#[cfg(test)]
impl Envelope {
    pub fn get_volume_mode(&self) -> VolumeMode {
        self.volume_mode
    }
    pub fn get_divider_period(&self) -> u8 {
        self.period
    }
    pub fn get_loop_flag(&self) -> bool {
        self.loop_flag
    }
    pub fn get_start_flag(&self) -> bool {
        self.start
    }
}

impl Snapshotable for Envelope {
    fn save(&self, s: &mut Snapshot) {
        s.write("start", self.start);
        s.write("divider", self.divider);
        s.write("decay", self.decay);
        s.write("loop", self.loop_flag);
        s.write("constant", self.volume_mode == VolumeMode::Constant);
        s.write("volume", self.period);
    }

    fn restore(&mut self, s: &Snapshot) {
        self.start = s.read("start");
        self.divider = s.read::<u8>("divider") & ENV_VOLUME;
        self.decay = s.read::<u8>("decay") & ENV_VOLUME;
        self.loop_flag = s.read("loop");
        self.volume_mode = if s.read("constant") {
            VolumeMode::Constant
        } else {
            VolumeMode::Envelope
        };
        self.period = s.read::<u8>("volume") & ENV_VOLUME;
        self.constant_volume = self.period;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(env: &mut Envelope, n: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(env.output());
            env.clock();
        }
        out
    }

    #[test]
    fn start_is_consumed_on_next_clock_and_resets_decay_and_divider() {
        let mut env = Envelope::new();
        env.set(0b0000_0100); // period = 4
        env.decay = 7;
        env.divider = 1;

        env.set_start_flag(true);
        assert!(env.get_start_flag());

        env.clock();

        assert!(!env.get_start_flag());
        assert_eq!(env.decay, 15);
        assert_eq!(env.divider, 4);
    }

    #[test]
    fn envelope_decrements_every_period_plus_one_clocks() {
        let mut env = Envelope::new();
        env.set(0b0000_0011); // period = 3
        env.set_start_flag(true);
        env.clock();

        let outs = step(&mut env, 10);
        assert_eq!(&outs[..5], &[15, 15, 15, 15, 14]);
    }

    #[test]
    fn period_zero_decrements_every_clock_after_start_consumed() {
        let mut env = Envelope::new();
        env.set(0b0000_0000);
        env.set_start_flag(true);
        env.clock();

        let outs = step(&mut env, 6);
        assert_eq!(outs, vec![15, 14, 13, 12, 11, 10]);
    }

    #[test]
    fn decay_stops_at_zero_without_loop() {
        let mut env = Envelope::new();
        env.set(0);
        env.set_start_flag(true);
        env.clock();
        let outs = step(&mut env, 20);
        assert_eq!(*outs.last().unwrap(), 0);
    }

    #[test]
    fn loop_flag_reloads_decay_from_zero_to_15() {
        let mut env = Envelope::new();
        env.set(0b0010_0000 | 0b0000_0001); // loop=1, period=1
        env.set_start_flag(true);
        env.clock();

        let outs = step(&mut env, 80);
        let i0 = outs.iter().position(|&v| v == 0).expect("never reached 0");
        assert!(outs[i0..].contains(&15), "never looped back to 15");
    }

    #[test]
    fn constant_volume_output_ignores_decay() {
        let mut env = Envelope::new();
        env.set(0b0001_1010); // constant mode, volume=10
        env.set_start_flag(true);
        env.clock();

        let outs = step(&mut env, 20);
        assert!(outs.iter().all(|&v| v == 10));
    }
}
