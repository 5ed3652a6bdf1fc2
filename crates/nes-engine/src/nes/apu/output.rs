use crate::nes::blip::Blip;

/// Audio output stage: the mixed DAC level is fed to a band-limited
/// synthesis buffer as deltas stamped with the CPU cycle inside the frame.
pub struct ApuOutput {
    blip: Blip,
    cpu_hz: f64,
    sample_rate: u32,
    t_cpu: u32,

    scratch_i16: Vec<i16>,
}

impl ApuOutput {
    pub fn new(cpu_hz: f64, sample_rate: u32, max_samples: usize) -> Self {
        assert!(sample_rate > 0, "sample rate must be non-zero");
        let mut blip = Blip::new(max_samples);
        blip.set_rates(cpu_hz, sample_rate as f64);
        blip.clear();

        Self {
            blip,
            cpu_hz,
            sample_rate,
            t_cpu: 0,
            scratch_i16: vec![0; max_samples],
        }
    }

    pub fn reset(&mut self) {
        self.blip.clear();
        self.t_cpu = 0;
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn set_rates(&mut self, cpu_hz: f64, sample_rate: u32) {
        if self.sample_rate == sample_rate && self.cpu_hz == cpu_hz {
            return;
        }
        *self = ApuOutput::new(cpu_hz, sample_rate, self.blip.size());
    }

    #[inline]
    pub fn add_delta(&mut self, delta: i32) {
        if delta != 0 {
            self.blip.add_delta(self.t_cpu, delta);
        }
    }

    #[inline]
    pub fn step_cpu_cycle(&mut self) {
        self.t_cpu += 1;
    }

    pub fn pending_cycles(&self) -> u32 {
        self.t_cpu
    }

    pub fn end_frame(&mut self) {
        let clocks = self.t_cpu;
        self.blip.end_frame(clocks);
        self.t_cpu = 0;
    }

    pub fn samples_available(&self) -> usize {
        self.blip.samples_avail()
    }

    pub fn clocks_needed(&self, sample_count: usize) -> u32 {
        self.blip.clocks_needed(sample_count)
    }

    /// Drains up to `out.len()` mono samples, or `out.len() / 2` frames when
    /// `stereo` (the mono signal is duplicated into both channels).
    /// Returns how many samples per channel were written.
    pub fn read_samples(&mut self, out: &mut [i16], stereo: bool) -> usize {
        if !stereo {
            let count = out.len();
            return self.blip.read_samples(out, count, false);
        }

        let want = out.len() / 2;
        if self.scratch_i16.len() < want {
            self.scratch_i16.resize(want, 0);
        }
        let got = self.blip.read_samples(&mut self.scratch_i16[..want], want, false);
        for (frame, &sample) in out.chunks_exact_mut(2).zip(&self.scratch_i16[..got]) {
            frame[0] = sample;
            frame[1] = sample;
        }
        got
    }

    /// Returns how many samples were actually written
    pub fn read_samples_f32(&mut self, out: &mut [f32]) -> usize {
        let want = out.len();
        if self.scratch_i16.len() < want {
            self.scratch_i16.resize(want, 0);
        }

        let got = self.blip.read_samples(&mut self.scratch_i16[..want], want, false);

        // Scale to [-1.0, 1.0)
        for (dst, &src) in out.iter_mut().zip(&self.scratch_i16[..got]) {
            *dst = src as f32 / 32768.0;
        }
        got
    }
}
