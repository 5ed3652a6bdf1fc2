//! Band-limited synthesis buffer.
//!
//! Amplitude changes are added as deltas at clock timestamps; each delta is
//! spread over [`HALF_WIDTH`] * 2 output samples using a windowed-sinc step
//! kernel so the resampled signal carries no aliasing. Samples become readable
//! once the frame containing them is closed with [`Blip::end_frame`].
//!
//! Clock positions are 64-bit fixed point with [`TIME_BITS`] fractional bits.
//! `set_rates` rounds the sample/clock factor up, so the buffer never produces
//! fewer samples than `seconds * sample_rate` over any run length.

const PRE_SHIFT: u32 = 32;
const TIME_BITS: u32 = PRE_SHIFT + 20;
const TIME_UNIT: u64 = 1 << TIME_BITS;

const BASS_SHIFT: u32 = 9;
const END_FRAME_EXTRA: usize = 2;
const HALF_WIDTH: usize = 8;
const BUF_EXTRA: usize = HALF_WIDTH * 2 + END_FRAME_EXTRA;
const PHASE_BITS: u32 = 5;
const PHASE_COUNT: usize = 1 << PHASE_BITS;
const DELTA_BITS: u32 = 15;
const DELTA_UNIT: i32 = 1 << DELTA_BITS;
const FRAC_BITS: u32 = TIME_BITS - PRE_SHIFT;

/// Maximum clock_rate / sample_rate ratio.
pub const MAX_RATIO: u32 = 1 << 20;

/// Maximum number of samples a single frame may span.
pub const MAX_FRAME: usize = 4000;

/// Sinc_Generator( 0.9, 0.55, 4.5 )
#[rustfmt::skip]
const BL_STEP: [[i16; HALF_WIDTH]; PHASE_COUNT + 1] = [
    [  43, -115,  350, -488, 1136, -914, 5861, 21022],
    [  44, -118,  348, -473, 1076, -799, 5274, 21001],
    [  45, -121,  344, -454, 1011, -677, 4706, 20936],
    [  46, -122,  336, -431,  942, -549, 4156, 20829],
    [  47, -123,  327, -404,  868, -418, 3629, 20679],
    [  47, -122,  316, -375,  792, -285, 3124, 20488],
    [  47, -120,  303, -344,  714, -151, 2644, 20256],
    [  46, -117,  289, -310,  634,  -17, 2188, 19985],
    [  46, -114,  273, -275,  553,  117, 1758, 19675],
    [  44, -108,  255, -237,  471,  247, 1356, 19327],
    [  43, -103,  237, -199,  390,  373,  981, 18944],
    [  42,  -98,  218, -160,  310,  495,  633, 18527],
    [  40,  -91,  198, -121,  231,  611,  314, 18078],
    [  38,  -84,  178,  -81,  153,  722,   22, 17599],
    [  36,  -76,  157,  -43,   80,  824, -241, 17092],
    [  34,  -68,  135,   -3,    8,  919, -476, 16558],
    [  32,  -61,  115,   34,  -60, 1006, -683, 16001],
    [  29,  -52,   94,   70, -123, 1083, -862, 15422],
    [  27,  -44,   73,  106, -184, 1152,-1015, 14824],
    [  25,  -36,   53,  139, -239, 1211,-1142, 14210],
    [  22,  -27,   34,  170, -290, 1261,-1244, 13582],
    [  20,  -20,   16,  199, -335, 1301,-1322, 12942],
    [  18,  -12,   -3,  226, -375, 1331,-1376, 12293],
    [  15,   -4,  -19,  250, -410, 1351,-1408, 11638],
    [  13,    3,  -35,  272, -439, 1361,-1419, 10979],
    [  11,    9,  -49,  292, -464, 1362,-1410, 10319],
    [   9,   16,  -63,  309, -483, 1354,-1383,  9660],
    [   7,   22,  -75,  322, -496, 1337,-1339,  9005],
    [   6,   26,  -85,  333, -504, 1312,-1280,  8355],
    [   4,   31,  -94,  341, -507, 1278,-1205,  7713],
    [   3,   35, -102,  347, -506, 1238,-1119,  7082],
    [   1,   40, -110,  350, -499, 1190,-1021,  6464],
    [   0,   43, -115,  350, -488, 1136, -914,  5861],
];

pub struct Blip {
    factor: u64,
    offset: u64,
    avail: usize,
    size: usize,
    integrator: i32,
    buf: Vec<i32>,
}

impl Blip {
    /// Creates a buffer holding up to `size` samples. Rates default to the
    /// maximum ratio until [`Blip::set_rates`] is called.
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "blip buffer size must be non-zero");
        let mut blip = Blip {
            factor: TIME_UNIT / MAX_RATIO as u64,
            offset: 0,
            avail: 0,
            size,
            integrator: 0,
            buf: vec![0; size + BUF_EXTRA],
        };
        blip.clear();
        blip
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Sets the input clock rate and output sample rate. The fixed-point factor
    /// is rounded up so accumulated sample counts never fall behind.
    pub fn set_rates(&mut self, clock_rate: f64, sample_rate: f64) {
        assert!(
            clock_rate > 0.0 && sample_rate > 0.0,
            "blip rates must be positive (clock {clock_rate}, sample {sample_rate})"
        );
        assert!(
            clock_rate / sample_rate <= MAX_RATIO as f64,
            "clock rate {clock_rate} too high relative to sample rate {sample_rate}"
        );
        let factor = TIME_UNIT as f64 * sample_rate / clock_rate;
        assert!(
            factor < u64::MAX as f64,
            "sample rate {sample_rate} too high relative to clock rate {clock_rate}"
        );
        self.factor = factor.ceil() as u64;
    }

    /// Drops all buffered deltas and samples. The rate ratio is kept.
    pub fn clear(&mut self) {
        self.offset = self.factor / 2;
        self.avail = 0;
        self.integrator = 0;
        self.buf.fill(0);
    }

    /// Number of clocks that must be added with `end_frame` before `samples`
    /// more samples become available.
    pub fn clocks_needed(&self, samples: usize) -> u32 {
        assert!(
            self.avail + samples <= self.size,
            "requested {samples} samples with {} of {} already buffered",
            self.avail,
            self.size
        );
        let needed = samples as u128 * TIME_UNIT as u128;
        let offset = self.offset as u128;
        if needed < offset {
            return 0;
        }
        let factor = self.factor as u128;
        ((needed - offset + factor - 1) / factor) as u32
    }

    /// Closes the current frame at `clocks` and makes its samples readable.
    /// Panics when the buffer cannot hold the resulting samples.
    pub fn end_frame(&mut self, clocks: u32) {
        let off = clocks as u128 * self.factor as u128 + self.offset as u128;
        self.avail += (off >> TIME_BITS) as usize;
        self.offset = (off & (TIME_UNIT as u128 - 1)) as u64;
        assert!(
            self.avail <= self.size,
            "blip buffer overflow: {} samples available, capacity {}",
            self.avail,
            self.size
        );
    }

    pub fn samples_avail(&self) -> usize {
        self.avail
    }

    fn slot(&self, time: u32) -> (usize, u64) {
        let fixed = ((time as u128 * self.factor as u128 + self.offset as u128) >> PRE_SHIFT) as u64;
        let index = self.avail + (fixed >> FRAC_BITS) as usize;
        assert!(
            index <= self.size + END_FRAME_EXTRA,
            "delta at clock {time} falls outside the buffered frame"
        );
        (index, fixed)
    }

    /// Adds an amplitude step at `time` using the interpolated kernel.
    pub fn add_delta(&mut self, time: u32, delta: i32) {
        let (index, fixed) = self.slot(time);

        let phase_shift = FRAC_BITS - PHASE_BITS;
        let phase = (fixed >> phase_shift) as usize & (PHASE_COUNT - 1);
        let interp = (fixed >> (phase_shift - DELTA_BITS)) as i32 & (DELTA_UNIT - 1);
        let delta2 = (delta * interp) >> DELTA_BITS;
        let delta = delta - delta2;

        let fwd = &BL_STEP[phase];
        let fwd_next = &BL_STEP[phase + 1];
        let rev = &BL_STEP[PHASE_COUNT - phase];
        let rev_next = &BL_STEP[PHASE_COUNT - phase - 1];

        let out = &mut self.buf[index..index + HALF_WIDTH * 2];
        for i in 0..HALF_WIDTH {
            out[i] += fwd[i] as i32 * delta + fwd_next[i] as i32 * delta2;
            out[HALF_WIDTH + i] +=
                rev[HALF_WIDTH - 1 - i] as i32 * delta + rev_next[HALF_WIDTH - 1 - i] as i32 * delta2;
        }
    }

    /// Adds an amplitude step at `time` with linear interpolation only.
    pub fn add_delta_fast(&mut self, time: u32, delta: i32) {
        let (index, fixed) = self.slot(time);

        let interp = (fixed >> (FRAC_BITS - DELTA_BITS)) as i32 & (DELTA_UNIT - 1);
        let delta2 = delta * interp;

        self.buf[index + 7] += delta * DELTA_UNIT - delta2;
        self.buf[index + 8] += delta2;
    }

    /// Reads up to `count` samples into `out`, returning how many were read.
    /// With `stereo` set, samples go to every other slot of `out`.
    pub fn read_samples(&mut self, out: &mut [i16], count: usize, stereo: bool) -> usize {
        let step = if stereo { 2 } else { 1 };
        let count = count.min(self.avail).min(out.len().div_ceil(step));
        if count == 0 {
            return 0;
        }

        let mut sum = self.integrator;
        for (i, &input) in self.buf[..count].iter().enumerate() {
            let s = (sum >> DELTA_BITS).clamp(i16::MIN as i32, i16::MAX as i32);
            sum = sum.wrapping_add(input);
            out[i * step] = s as i16;
            // High-pass filter
            sum = sum.wrapping_sub(s << (DELTA_BITS - BASS_SHIFT));
        }
        self.integrator = sum;
        self.remove_samples(count);
        count
    }

    fn remove_samples(&mut self, count: usize) {
        let remain = self.avail + BUF_EXTRA - count;
        self.avail -= count;
        self.buf.copy_within(count..count + remain, 0);
        self.buf[remain..remain + count].fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NTSC_CPU: f64 = 1_789_773.0;

    fn blip(size: usize, clock_rate: f64, sample_rate: f64) -> Blip {
        let mut b = Blip::new(size);
        b.set_rates(clock_rate, sample_rate);
        b.clear();
        b
    }

    #[test]
    fn test_kernel_rows_pair_to_unit_gain() {
        for phase in 0..=PHASE_COUNT {
            let fwd: i32 = BL_STEP[phase].iter().map(|&v| v as i32).sum();
            let rev: i32 = BL_STEP[PHASE_COUNT - phase].iter().map(|&v| v as i32).sum();
            assert_eq!(fwd + rev, DELTA_UNIT, "phase {phase}");
        }
    }

    #[test]
    fn test_clocks_needed_close_to_ratio() {
        for &sample_rate in &[8_000.0, 22_050.0, 44_100.0, 48_000.0, 96_000.0] {
            let b = blip(8192, NTSC_CPU, sample_rate);
            let ratio = NTSC_CPU / sample_rate;
            for n in [1usize, 2, 10, 100, 735, 1000, 4000] {
                let needed = b.clocks_needed(n) as f64;
                let ideal = n as f64 * ratio;
                assert!(
                    (needed - ideal).abs() <= 1.0,
                    "rate {sample_rate}, n {n}: {needed} vs {ideal}"
                );
            }
        }
    }

    #[test]
    fn test_clocks_needed_is_exact() {
        let mut b = blip(4096, NTSC_CPU, 44_100.0);
        b.end_frame(1234);
        for n in [1usize, 50, 733, 2000] {
            let needed = b.clocks_needed(n);

            let mut probe = blip(4096, NTSC_CPU, 44_100.0);
            probe.end_frame(1234);
            let before = probe.samples_avail();
            probe.end_frame(needed);
            assert!(probe.samples_avail() - before >= n);

            let mut short = blip(4096, NTSC_CPU, 44_100.0);
            short.end_frame(1234);
            short.end_frame(needed - 1);
            assert!(short.samples_avail() - before < n);
        }
    }

    #[test]
    fn test_clocks_needed_is_monotonic() {
        let b = blip(4096, NTSC_CPU, 48_000.0);
        let mut last = 0;
        for n in 0..4096 {
            let needed = b.clocks_needed(n);
            assert!(needed >= last);
            last = needed;
        }
    }

    #[test]
    fn test_no_long_term_drift() {
        for &(clock_rate, sample_rate) in &[
            (1_789_773u32, 44_100u32),
            (1_789_773, 48_000),
            (1_662_607, 44_100),
            (1_773_448, 96_000),
        ] {
            let mut b = blip(4096, clock_rate as f64, sample_rate as f64);
            let mut out = vec![0i16; 4096];
            let seconds = 60u64;
            let mut remaining = clock_rate as u64 * seconds;
            let mut total = 0u64;
            while remaining > 0 {
                let frame = remaining.min(29_781) as u32;
                b.end_frame(frame);
                remaining -= frame as u64;
                total += b.read_samples(&mut out, 4096, false) as u64;
            }
            assert_eq!(total, seconds * sample_rate as u64, "{clock_rate} -> {sample_rate}");
        }
    }

    #[test]
    fn test_read_never_exceeds_avail() {
        let mut b = blip(1024, NTSC_CPU, 44_100.0);
        b.end_frame(b.clocks_needed(100));
        let avail = b.samples_avail();
        assert!(avail >= 100);

        let mut out = [0i16; 2048];
        assert_eq!(b.read_samples(&mut out, 30, false), 30);
        assert_eq!(b.samples_avail(), avail - 30);

        let read = b.read_samples(&mut out, 2048, false);
        assert_eq!(read, avail - 30);
        assert_eq!(b.samples_avail(), 0);
        assert_eq!(b.read_samples(&mut out, 10, false), 0);
    }

    #[test]
    fn test_read_is_limited_by_output_length() {
        let mut b = blip(1024, NTSC_CPU, 44_100.0);
        b.end_frame(b.clocks_needed(100));
        let mut out = [0i16; 9];
        assert_eq!(b.read_samples(&mut out, 100, true), 5);
        assert_eq!(b.read_samples(&mut out, 100, false), 9);
    }

    #[test]
    fn test_end_frame_within_capacity_is_fine() {
        let mut b = blip(1000, 1_000_000.0, 10_000.0);
        let clocks = b.clocks_needed(1000);
        b.end_frame(clocks);
        assert_eq!(b.samples_avail(), 1000);
    }

    #[test]
    #[should_panic(expected = "blip buffer overflow")]
    fn test_end_frame_beyond_capacity_panics() {
        let mut b = blip(1000, 1_000_000.0, 10_000.0);
        let clocks = b.clocks_needed(1000);
        b.end_frame(clocks + 100);
    }

    #[test]
    #[should_panic]
    fn test_add_delta_outside_frame_panics() {
        let mut b = blip(100, 1_000_000.0, 10_000.0);
        b.add_delta(20_000, 100);
    }

    #[test]
    fn test_fast_and_interpolated_deltas_accumulate_equally() {
        for time in [0u32, 13, 40, 77, 99] {
            let mut slow = blip(256, 1_000_000.0, 10_000.0);
            let mut fast = blip(256, 1_000_000.0, 10_000.0);
            slow.add_delta(time, 1000);
            fast.add_delta_fast(time, 1000);
            let slow_sum: i64 = slow.buf.iter().map(|&v| v as i64).sum();
            let fast_sum: i64 = fast.buf.iter().map(|&v| v as i64).sum();
            assert_eq!(slow_sum, 1000 << DELTA_BITS);
            assert_eq!(slow_sum, fast_sum, "time {time}");
        }
    }

    #[test]
    fn test_fast_and_interpolated_settle_to_same_value() {
        let mut slow = blip(8192, 1_000_000.0, 10_000.0);
        let mut fast = blip(8192, 1_000_000.0, 10_000.0);
        slow.add_delta(37, 5000);
        fast.add_delta_fast(37, 5000);
        for _ in 0..8 {
            slow.end_frame(slow.clocks_needed(1000));
            fast.end_frame(fast.clocks_needed(1000));
        }

        let mut a = vec![0i16; 8000];
        let mut b = vec![0i16; 8000];
        slow.read_samples(&mut a, 8000, false);
        fast.read_samples(&mut b, 8000, false);

        // The high-pass filter pulls both back to the same resting level.
        assert_eq!(a[7000..], b[7000..]);
        assert!(a[7000..].iter().all(|&s| s == 0));
    }

    #[test]
    fn test_output_saturates_without_wrapping() {
        for (delta, limit) in [(40_000, i16::MAX), (-40_000, i16::MIN)] {
            let mut b = blip(1024, 1_000_000.0, 10_000.0);
            b.add_delta_fast(0, delta);
            b.end_frame(b.clocks_needed(64));
            let mut out = [0i16; 64];
            b.read_samples(&mut out, 64, false);
            assert!(out[12..40].iter().all(|&s| s == limit), "{:?}", &out[..40]);
            assert!(out.iter().all(|&s| s.signum() != -limit.signum()));
        }
    }

    #[test]
    fn test_stereo_read_interleaves() {
        let mut b = blip(256, 1_000_000.0, 10_000.0);
        b.add_delta_fast(0, 1000);
        b.end_frame(b.clocks_needed(32));
        let mut out = [0x55i16; 64];
        let read = b.read_samples(&mut out, 32, true);
        assert_eq!(read, 32);
        assert!(out.iter().skip(1).step_by(2).all(|&s| s == 0x55));
        assert!(out[20] > 900);
    }

    #[test]
    fn test_clear_keeps_ratio() {
        let mut b = blip(4096, NTSC_CPU, 44_100.0);
        let before = b.clocks_needed(735);
        b.add_delta(10, 300);
        b.end_frame(5000);
        b.clear();
        assert_eq!(b.samples_avail(), 0);
        assert_eq!(b.clocks_needed(735), before);
    }
}
