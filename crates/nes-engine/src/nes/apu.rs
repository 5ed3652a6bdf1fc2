use crate::nes::apu::output::ApuOutput;
use crate::nes::apu::status_register::ApuStatusRegister;
use crate::nes::region::Region;
use crate::nes::snapshot::{Ordinal, Snapshot, Snapshotable};
use dmc_channel::DmcChannel;
use noise_channel::NoiseChannel;
use once_cell::sync::Lazy;
use pulse_channel::PulseChannel;
use triangle_channel::TriangleChannel;
use units::sweep::PulseType;

mod dmc_channel;
mod noise_channel;
mod output;
mod pulse_channel;
mod status_register;
mod triangle_channel;
mod units;

const DAC_SCALE: f32 = 32767.0; // i16 range

/// Seconds of audio the synthesis buffer can hold between drains.
const BUFFER_SECONDS: f64 = 0.1;

// Frame sequencer steps, in APU cycles (two CPU cycles)
const FRAME_STEPS_NTSC: [u32; 5] = [3728, 7456, 11185, 14914, 18640];
const FRAME_STEPS_PAL: [u32; 5] = [4156, 8313, 12469, 16626, 20782];

// https://www.nesdev.org/wiki/APU_Mixer#Lookup_Table
static PULSE_TABLE: Lazy<[f32; 31]> = Lazy::new(|| {
    let mut table = [0.0; 31];
    for (n, entry) in table.iter_mut().enumerate().skip(1) {
        *entry = 95.52 / (8128.0 / n as f32 + 100.0);
    }
    table
});

static TND_TABLE: Lazy<[f32; 203]> = Lazy::new(|| {
    let mut table = [0.0; 203];
    for (n, entry) in table.iter_mut().enumerate().skip(1) {
        *entry = 163.67 / (24329.0 / n as f32 + 100.0);
    }
    table
});

/*
   mode 0:    mode 1:       function
   ---------  -----------  -----------------------------
    - - - f    - - - - -    IRQ (if bit 6 is clear)
    - l - l    - l - - l    Length counter and sweep
    e e e e    e e e - e    Envelope and linear counter
*/

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceMode {
    Mode0,
    Mode1,
}

pub enum FrameClock {
    None,
    Quarter,
    QuarterAndHalf,
}

impl FrameClock {
    pub fn is_quarter(&self) -> bool {
        matches!(self, FrameClock::Quarter | FrameClock::QuarterAndHalf)
    }
    pub fn is_half(&self) -> bool {
        matches!(self, FrameClock::QuarterAndHalf)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ApuPhase {
    Even,
    Odd,
}

impl ApuPhase {
    pub fn toggle(&mut self) {
        *self = self.opposite();
    }

    pub fn is_even(&self) -> bool {
        matches!(self, ApuPhase::Even)
    }

    pub fn is_odd(&self) -> bool {
        matches!(self, ApuPhase::Odd)
    }

    pub fn opposite(&self) -> Self {
        match self {
            ApuPhase::Even => ApuPhase::Odd,
            ApuPhase::Odd => ApuPhase::Even,
        }
    }
}

impl Ordinal for ApuPhase {
    fn ordinal(&self) -> u8 {
        *self as u8
    }

    fn from_ordinal(ordinal: u8) -> Option<Self> {
        match ordinal {
            0 => Some(ApuPhase::Even),
            1 => Some(ApuPhase::Odd),
            _ => None,
        }
    }
}

/// Channel selector for the per-channel mute switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApuChannel {
    Pulse1,
    Pulse2,
    Triangle,
    Noise,
    Dmc,
}

pub struct APU {
    region: Region,
    cpu_phase: ApuPhase,
    seq_phase: ApuPhase,

    output: ApuOutput,
    last_dac: i32,
    volume: f32,

    pub pulse1: PulseChannel,
    pub pulse2: PulseChannel,
    pub triangle: TriangleChannel,
    pub noise: NoiseChannel,
    pub dmc: DmcChannel,

    pub status_register: ApuStatusRegister,

    pub mute_pulse1: bool,
    pub mute_pulse2: bool,
    pub mute_triangle: bool,
    pub mute_noise: bool,
    pub mute_dmc: bool,

    pub master_sequence_mode: SequenceMode,
    pub clock_counter: u32,
    frame_steps: [u32; 5],
    pending_quarter_clock: bool,
    pending_half_clock: bool,
    pending_clock_reset: bool,
    pending_frame_reset_delay: u8,

    frame_irq_disable: bool,
    frame_irq_rising: bool,
    frame_irq_reassert: u8,
}

impl Default for APU {
    fn default() -> Self {
        Self::new(Region::Ntsc, 44_100)
    }
}

impl APU {
    pub fn new(region: Region, sample_rate: u32) -> APU {
        let max_samples = (sample_rate as f64 * BUFFER_SECONDS).ceil() as usize;
        let mut apu = APU {
            region,
            cpu_phase: ApuPhase::Even,
            seq_phase: ApuPhase::Even,

            output: ApuOutput::new(region.cpu_clock_hz(), sample_rate, max_samples.max(1)),
            last_dac: 0,
            volume: 1.0,

            pulse1: PulseChannel::new(PulseType::Pulse1),
            pulse2: PulseChannel::new(PulseType::Pulse2),
            triangle: TriangleChannel::new(),
            noise: NoiseChannel::new(region),
            dmc: DmcChannel::new(region),

            status_register: ApuStatusRegister::new(),

            mute_pulse1: false,
            mute_pulse2: false,
            mute_triangle: false,
            mute_noise: false,
            mute_dmc: false,

            master_sequence_mode: SequenceMode::Mode0,
            clock_counter: 0,
            frame_steps: Self::frame_steps(region),
            pending_quarter_clock: false,
            pending_half_clock: false,
            pending_clock_reset: false,
            pending_frame_reset_delay: 0,

            frame_irq_disable: false,
            frame_irq_rising: false,
            frame_irq_reassert: 0,
        };
        // The triangle idles at a non-zero level; start the DAC there
        apu.last_dac = apu.current_dac();
        apu
    }

    fn frame_steps(region: Region) -> [u32; 5] {
        match region {
            Region::Pal => FRAME_STEPS_PAL,
            Region::Ntsc | Region::Dendy => FRAME_STEPS_NTSC,
        }
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn set_region(&mut self, region: Region) {
        self.region = region;
        self.frame_steps = Self::frame_steps(region);
        self.noise.set_region(region);
        self.dmc.set_region(region);
        let sample_rate = self.output.sample_rate();
        self.output.set_rates(region.cpu_clock_hz(), sample_rate);
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.output.set_rates(self.region.cpu_clock_hz(), sample_rate);
    }

    pub fn sample_rate(&self) -> u32 {
        self.output.sample_rate()
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    pub fn set_silence_triangle_ultrasonic(&mut self, silence: bool) {
        self.triangle.set_silence_ultrasonic(silence);
    }

    pub fn set_channel_muted(&mut self, channel: ApuChannel, muted: bool) {
        match channel {
            ApuChannel::Pulse1 => self.mute_pulse1 = muted,
            ApuChannel::Pulse2 => self.mute_pulse2 = muted,
            ApuChannel::Triangle => self.mute_triangle = muted,
            ApuChannel::Noise => self.mute_noise = muted,
            ApuChannel::Dmc => self.mute_dmc = muted,
        }
    }

    /// A soft reset silences every channel (as if $4015 were cleared) and
    /// restarts the frame sequencer with its current mode. A hard reset
    /// returns to power-on state.
    pub fn reset(&mut self, soft: bool) {
        if !soft {
            let mut fresh = APU::new(self.region, self.output.sample_rate());
            fresh.volume = self.volume;
            fresh.mute_pulse1 = self.mute_pulse1;
            fresh.mute_pulse2 = self.mute_pulse2;
            fresh.mute_triangle = self.mute_triangle;
            fresh.mute_noise = self.mute_noise;
            fresh.mute_dmc = self.mute_dmc;
            fresh.triangle.set_silence_ultrasonic(self.triangle.silence_ultrasonic());
            *self = fresh;
            return;
        }

        self.write(0x4015, 0x00);
        self.dmc.irq_pending = false;
        self.status_register.remove(ApuStatusRegister::FRAME_INTERRUPT);
        self.frame_irq_reassert = 0;
        self.pending_quarter_clock = false;
        self.pending_half_clock = false;
        self.pending_clock_reset = false;
        self.clock_counter = 0;
        self.pending_frame_reset_delay = if self.cpu_phase.is_odd() { 3 } else { 4 };
        self.output.reset();
        self.last_dac = self.current_dac();
    }

    /// $4015 read. Clears the frame interrupt flag unless it was raised on
    /// this very cycle.
    pub fn read_status(&mut self) -> u8 {
        let output = self.peek_status();

        if !self.frame_irq_rising {
            self.status_register
                .remove(ApuStatusRegister::FRAME_INTERRUPT);
        }

        output
    }

    /// $4015 without the read side effect.
    pub fn peek_status(&self) -> u8 {
        let mut status = ApuStatusRegister::empty();
        status.set(
            ApuStatusRegister::PULSE_CHANNEL_1,
            self.pulse1.length_active(),
        );
        status.set(
            ApuStatusRegister::PULSE_CHANNEL_2,
            self.pulse2.length_active(),
        );
        status.set(
            ApuStatusRegister::TRIANGLE_CHANNEL,
            self.triangle.length_active(),
        );
        status.set(ApuStatusRegister::NOISE_CHANNEL, self.noise.length_active());
        status.set(ApuStatusRegister::DMC_CHANNEL, self.dmc.is_active());
        status.set(
            ApuStatusRegister::FRAME_INTERRUPT,
            self.status_register
                .contains(ApuStatusRegister::FRAME_INTERRUPT),
        );
        status.set(ApuStatusRegister::DMC_INTERRUPT, self.dmc.irq_pending);
        status.bits()
    }

    pub fn write(&mut self, addr: u16, value: u8) {
        match addr {
            0x4000 => self.pulse1.write_4000(value),
            0x4001 => self.pulse1.write_4001(value),
            0x4002 => self.pulse1.write_4002(value),
            0x4003 => self.pulse1.write_4003(value),

            0x4004 => self.pulse2.write_4000(value),
            0x4005 => self.pulse2.write_4001(value),
            0x4006 => self.pulse2.write_4002(value),
            0x4007 => self.pulse2.write_4003(value),

            0x4008 => self.triangle.write_4008(value),
            0x400A => self.triangle.write_400a(value),
            0x400B => self.triangle.write_400b(value),

            0x400C => self.noise.write_400c(value),
            0x400E => self.noise.write_400e(value),
            0x400F => self.noise.write_400f(value),

            0x4010 => self.dmc.write_4010(value),
            0x4011 => self.dmc.write_4011(value),
            0x4012 => self.dmc.write_4012(value),
            0x4013 => self.dmc.write_4013(value),

            0x4015 => {
                let new_status = ApuStatusRegister::from_bits_truncate(value);
                let enable_pulse1 = new_status.contains(ApuStatusRegister::PULSE_CHANNEL_1);
                let enable_pulse2 = new_status.contains(ApuStatusRegister::PULSE_CHANNEL_2);
                let enable_triangle = new_status.contains(ApuStatusRegister::TRIANGLE_CHANNEL);
                let enable_noise = new_status.contains(ApuStatusRegister::NOISE_CHANNEL);
                let enable_dmc = new_status.contains(ApuStatusRegister::DMC_CHANNEL);

                self.status_register
                    .set(ApuStatusRegister::PULSE_CHANNEL_1, enable_pulse1);
                self.status_register
                    .set(ApuStatusRegister::PULSE_CHANNEL_2, enable_pulse2);
                self.status_register
                    .set(ApuStatusRegister::TRIANGLE_CHANNEL, enable_triangle);
                self.status_register
                    .set(ApuStatusRegister::NOISE_CHANNEL, enable_noise);
                self.status_register
                    .set(ApuStatusRegister::DMC_CHANNEL, enable_dmc);

                self.pulse1.set_enabled(enable_pulse1);
                self.pulse2.set_enabled(enable_pulse2);
                self.triangle.set_enabled(enable_triangle);
                self.noise.set_enabled(enable_noise);
                self.dmc.set_enabled(enable_dmc, self.cpu_phase.is_odd());

                // Writing to this register clears the DMC interrupt flag
                self.dmc.irq_pending = false;
            }
            0x4017 => {
                /*
                   0x4017: MI-- ----
                       M: Mode.- bit 7
                       I: IRQ Off - bit 6
                */
                self.master_sequence_mode = if value & 0b1000_0000 != 0 {
                    SequenceMode::Mode1
                } else {
                    SequenceMode::Mode0
                };
                self.frame_irq_disable = value & 0b0100_0000 != 0;

                // The sequencer restarts 3 or 4 CPU cycles after the write,
                // depending on which half of the APU cycle it lands in
                self.pending_frame_reset_delay = if self.cpu_phase.is_odd() { 3 } else { 4 };

                if self.frame_irq_disable {
                    self.status_register
                        .remove(ApuStatusRegister::FRAME_INTERRUPT);
                    self.frame_irq_reassert = 0;
                }
            }
            0x4009 | 0x400D => log::debug!("write to unused APU register ${addr:04X}"),
            _ => log::warn!("write to unmapped APU address ${addr:04X}"),
        }
    }

    /// Clocks every CPU cycle
    pub fn clock(&mut self) {
        self.frame_irq_rising = false;

        // Frame clock triggers are delayed by 1 CPU cycle
        let frame_clock = match (self.pending_quarter_clock, self.pending_half_clock) {
            (_, true) => FrameClock::QuarterAndHalf,
            (true, false) => FrameClock::Quarter,
            (false, false) => FrameClock::None,
        };
        self.pending_quarter_clock = false;
        self.pending_half_clock = false;

        // A reset on this cycle stops the sequencer from also ticking forward
        let mut just_reset = false;
        if self.pending_frame_reset_delay != 0 {
            self.pending_frame_reset_delay -= 1;
            if self.pending_frame_reset_delay == 0 {
                self.clock_counter = 0;
                self.pending_clock_reset = false;
                just_reset = true;

                // Re-phase sequencer according to CPU phase
                self.seq_phase = self.cpu_phase.opposite();

                // Entering 5-step mode clocks quarter and half immediately
                if self.master_sequence_mode == SequenceMode::Mode1 {
                    self.pending_quarter_clock = true;
                    self.pending_half_clock = true;
                }
            }
        }

        if !just_reset && self.seq_phase.is_even() {
            self.step_sequencer();
        }

        let apu_tick = self.cpu_phase.is_even();
        self.pulse1.clock(&frame_clock, apu_tick);
        self.pulse2.clock(&frame_clock, apu_tick);
        self.triangle.clock(&frame_clock);
        self.noise.clock(&frame_clock);
        self.dmc.clock();

        // Register writes that raced this cycle's length clock land now
        self.pulse1.length_counter.commit();
        self.pulse2.length_counter.commit();
        self.triangle.length_counter.commit();
        self.noise.length_counter.commit();

        // The frame IRQ is asserted for 3 consecutive cycles
        if self.frame_irq_disable {
            self.frame_irq_reassert = 0;
        } else if self.frame_irq_reassert != 0 {
            self.frame_irq_reassert -= 1;
            self.frame_irq_rising = true;
            self.status_register
                .insert(ApuStatusRegister::FRAME_INTERRUPT);
        }

        self.clock_apu_output();
        self.cpu_phase.toggle();
        self.seq_phase.toggle();
    }

    fn step_sequencer(&mut self) {
        if self.pending_clock_reset {
            self.pending_clock_reset = false;
            self.clock_counter = 0;
            return;
        }

        self.clock_counter += 1;
        let steps = self.frame_steps;
        let counter = self.clock_counter;
        match self.master_sequence_mode {
            SequenceMode::Mode0 => {
                if counter == steps[0] || counter == steps[2] {
                    self.pending_quarter_clock = true;
                } else if counter == steps[1] {
                    self.pending_quarter_clock = true;
                    self.pending_half_clock = true;
                } else if counter == steps[3] {
                    self.pending_quarter_clock = true;
                    self.pending_half_clock = true;
                    self.pending_clock_reset = true;

                    if !self.frame_irq_disable {
                        self.status_register
                            .insert(ApuStatusRegister::FRAME_INTERRUPT);
                        self.frame_irq_rising = true;
                        self.frame_irq_reassert = 2;
                    }
                }
            }
            SequenceMode::Mode1 => {
                if counter == steps[0] || counter == steps[2] {
                    self.pending_quarter_clock = true;
                } else if counter == steps[1] {
                    self.pending_quarter_clock = true;
                    self.pending_half_clock = true;
                } else if counter == steps[4] {
                    self.pending_quarter_clock = true;
                    self.pending_half_clock = true;
                    self.pending_clock_reset = true;
                }
            }
        }
    }

    fn current_dac(&self) -> i32 {
        (self.sample() * DAC_SCALE * self.volume).round() as i32
    }

    fn clock_apu_output(&mut self) {
        let dac = self.current_dac();

        let delta = dac - self.last_dac;
        if delta != 0 {
            self.output.add_delta(delta);
            self.last_dac = dac;
        }

        self.output.step_cpu_cycle();
    }

    fn sample(&self) -> f32 {
        let pulse1 = if self.mute_pulse1 { 0 } else { self.pulse1.sample() };
        let pulse2 = if self.mute_pulse2 { 0 } else { self.pulse2.sample() };
        let triangle = if self.mute_triangle { 0 } else { self.triangle.sample() };
        let noise = if self.mute_noise { 0 } else { self.noise.sample() };
        let dmc = if self.mute_dmc { 0 } else { self.dmc.sample() };

        #[cfg(feature = "linear-apu-approximation")]
        {
            // See linear approximation on: https://www.nesdev.org/wiki/APU_Mixer
            let pulse = (pulse1 + pulse2) as f32;
            let tnd = 0.00851 * triangle as f32 + 0.00494 * noise as f32 + 0.00335 * dmc as f32;
            0.00752 * pulse + tnd
        }
        #[cfg(not(feature = "linear-apu-approximation"))]
        {
            let pulse_out = PULSE_TABLE[(pulse1 + pulse2) as usize];
            let tnd_index = 3 * triangle as usize + 2 * noise as usize + dmc as usize;
            pulse_out + TND_TABLE[tnd_index]
        }
    }

    #[inline(always)]
    pub fn irq_line(&self) -> bool {
        let frame_interrupt = self
            .status_register
            .contains(ApuStatusRegister::FRAME_INTERRUPT);

        frame_interrupt || self.dmc.irq_pending
    }

    /// Address the DMC wants fetched, if its sample buffer is empty.
    pub fn dmc_dma_request(&self) -> Option<u16> {
        self.dmc.dma_request()
    }

    /// Delivers the byte read by a DMC DMA.
    pub fn dmc_dma_complete(&mut self, value: u8) {
        self.dmc.fill_sample_buffer(value);
    }

    /// Closes the audio frame at the current CPU cycle.
    pub fn end_frame(&mut self) {
        self.output.end_frame();
    }

    /// CPU cycles clocked since the last `end_frame`.
    pub fn pending_cycles(&self) -> u32 {
        self.output.pending_cycles()
    }

    pub fn samples_available(&self) -> usize {
        self.output.samples_available()
    }

    /// See [`ApuOutput::read_samples`]
    pub fn read_samples(&mut self, out: &mut [i16], stereo: bool) -> usize {
        self.output.read_samples(out, stereo)
    }

    pub fn read_samples_f32(&mut self, out: &mut [f32]) -> usize {
        self.output.read_samples_f32(out)
    }

    /// CPU cycles needed to generate `N` more samples at current rates
    pub fn clocks_needed(&self, sample_count: usize) -> u32 {
        self.output.clocks_needed(sample_count)
    }
}

impl Snapshotable for APU {
    fn save(&self, s: &mut Snapshot) {
        s.write_enum("cpuPhase", self.cpu_phase);
        s.write_enum("seqPhase", self.seq_phase);
        s.write_snapshot("square1", &self.pulse1);
        s.write_snapshot("square2", &self.pulse2);
        s.write_snapshot("triangle", &self.triangle);
        s.write_snapshot("noise", &self.noise);
        s.write_snapshot("dmc", &self.dmc);
        s.write("status", self.status_register.bits());
        s.write("fiveStepMode", self.master_sequence_mode == SequenceMode::Mode1);
        s.write("frameCounter", self.clock_counter);
        s.write("pendingQuarter", self.pending_quarter_clock);
        s.write("pendingHalf", self.pending_half_clock);
        s.write("pendingCounterReset", self.pending_clock_reset);
        s.write("resetDelay", self.pending_frame_reset_delay);
        s.write("irqInhibit", self.frame_irq_disable);
        s.write("irqRising", self.frame_irq_rising);
        s.write("irqReassert", self.frame_irq_reassert);
    }

    fn restore(&mut self, s: &Snapshot) {
        self.cpu_phase = s.read_enum("cpuPhase", ApuPhase::Even);
        self.seq_phase = s.read_enum("seqPhase", ApuPhase::Even);
        s.restore_nested("square1", &mut self.pulse1);
        s.restore_nested("square2", &mut self.pulse2);
        s.restore_nested("triangle", &mut self.triangle);
        s.restore_nested("noise", &mut self.noise);
        s.restore_nested("dmc", &mut self.dmc);
        self.status_register = ApuStatusRegister::from_bits_truncate(s.read("status"));
        self.master_sequence_mode = if s.read("fiveStepMode") {
            SequenceMode::Mode1
        } else {
            SequenceMode::Mode0
        };
        self.clock_counter = s.read::<u32>("frameCounter").min(self.frame_steps[4]);
        self.pending_quarter_clock = s.read("pendingQuarter");
        self.pending_half_clock = s.read("pendingHalf");
        self.pending_clock_reset = s.read("pendingCounterReset");
        self.pending_frame_reset_delay = s.read::<u8>("resetDelay").min(4);
        self.frame_irq_disable = s.read("irqInhibit");
        self.frame_irq_rising = s.read("irqRising");
        self.frame_irq_reassert = s.read::<u8>("irqReassert").min(2);

        // Buffered audio belongs to the timeline being left
        self.output.reset();
        self.last_dac = self.current_dac();
    }
}

#[cfg(test)]
mod apu_tests;
