pub const DOTS: usize = 341;

/// Lines that share one dot schedule. Post-render and vblank lines do no
/// memory work, so only two tables are built.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ScanlineKind {
    Visible,
    PreRender,
    Idle,
}

impl ScanlineKind {
    pub fn of(scanline: i16) -> ScanlineKind {
        match scanline {
            -1 => ScanlineKind::PreRender,
            0..=239 => ScanlineKind::Visible,
            _ => ScanlineKind::Idle,
        }
    }
}

static PPU_SCHEDULE: [[DotOperations; DOTS]; 2] = build_schedule();
static IDLE_DOT: DotOperations = DotOperations::new();

#[inline(always)]
pub fn dot_operations(kind: ScanlineKind, dot: u16) -> &'static DotOperations {
    match kind {
        ScanlineKind::Visible => &PPU_SCHEDULE[0][dot as usize],
        ScanlineKind::PreRender => &PPU_SCHEDULE[1][dot as usize],
        ScanlineKind::Idle => &IDLE_DOT,
    }
}

/// Mask for operations that only happen with rendering enabled
pub const RENDER_OPS: u32 = !bit(PpuOperation::RenderPixel);

pub const fn bit(op: PpuOperation) -> u32 {
    1u32 << (op as u8)
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum PpuOperation {
    FetchNameTable,
    FetchAttribute,
    FetchTileLow,
    FetchTileHigh,
    LoadBackgroundRegisters,

    IncCoarseX,
    IncFineY,
    CopyHorizV,
    CopyVertV,

    ShiftRegisters,
    ClearSecondaryOam,
    EvaluateSprites,
    FetchSprites,

    RenderPixel,

    None,
}

#[derive(Copy, Clone, Debug)]
pub struct DotOperations {
    pub len: u8,
    pub ops: [PpuOperation; 7],
}

impl DotOperations {
    pub const fn new() -> Self {
        Self {
            len: 0,
            ops: [PpuOperation::None; 7],
        }
    }

    pub const fn push(mut self, op: PpuOperation) -> Self {
        self.ops[self.len as usize] = op;
        self.len += 1;
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = PpuOperation> + '_ {
        self.ops[..self.len as usize].iter().copied()
    }
}

#[cfg(test)]
impl DotOperations {
    pub fn contains(&self, op: PpuOperation) -> bool {
        self.iter().any(|o| o == op)
    }
}

const fn build_schedule() -> [[DotOperations; DOTS]; 2] {
    let mut table = [[DotOperations::new(); DOTS]; 2];
    let mut dot = 0;
    while dot < DOTS {
        table[0][dot] = schedule_for(ScanlineKind::Visible, dot);
        table[1][dot] = schedule_for(ScanlineKind::PreRender, dot);
        dot += 1;
    }
    table
}

/// Operations for one dot, in execution order
const fn schedule_for(kind: ScanlineKind, dot: usize) -> DotOperations {
    let mut ops = DotOperations::new();
    let visible = matches!(kind, ScanlineKind::Visible);
    let prerender = matches!(kind, ScanlineKind::PreRender);

    let bg_fetch_window = (dot >= 1 && dot <= 256) || (dot >= 321 && dot <= 336);

    // Output uses the shifters before they move for this dot
    if visible && dot >= 1 && dot <= 256 {
        ops = ops.push(PpuOperation::RenderPixel);
    }

    if bg_fetch_window {
        ops = ops.push(PpuOperation::ShiftRegisters);
        match dot % 8 {
            1 => ops = ops.push(PpuOperation::FetchNameTable),
            3 => ops = ops.push(PpuOperation::FetchAttribute),
            5 => ops = ops.push(PpuOperation::FetchTileLow),
            7 => ops = ops.push(PpuOperation::FetchTileHigh),
            _ => {}
        }
        if dot % 8 == 0 {
            ops = ops.push(PpuOperation::LoadBackgroundRegisters);
            ops = ops.push(PpuOperation::IncCoarseX);
        }
    }

    // Unused nametable fetches at the end of the line
    if dot == 337 || dot == 339 {
        ops = ops.push(PpuOperation::FetchNameTable);
    }

    if dot == 256 {
        ops = ops.push(PpuOperation::IncFineY);
    }
    if dot == 257 {
        ops = ops.push(PpuOperation::CopyHorizV);
    }
    if prerender && dot >= 280 && dot <= 304 {
        ops = ops.push(PpuOperation::CopyVertV);
    }

    if visible && dot >= 1 && dot <= 64 {
        ops = ops.push(PpuOperation::ClearSecondaryOam);
    }
    if visible && dot >= 65 && dot <= 256 {
        ops = ops.push(PpuOperation::EvaluateSprites);
    }
    if dot >= 257 && dot <= 320 {
        ops = ops.push(PpuOperation::FetchSprites);
    }

    ops
}

#[cfg(test)]
mod test {
    use super::*;

    fn assert_has(kind: ScanlineKind, dot: u16, op: PpuOperation) {
        let ops = dot_operations(kind, dot);
        assert!(
            ops.contains(op),
            "Expected {:?} at {:?} dot {} but got {:?}",
            op,
            kind,
            dot,
            &ops.ops[..ops.len as usize]
        );
    }

    fn assert_not(kind: ScanlineKind, dot: u16, op: PpuOperation) {
        let ops = dot_operations(kind, dot);
        assert!(
            !ops.contains(op),
            "Did not expect {:?} at {:?} dot {} but got {:?}",
            op,
            kind,
            dot,
            &ops.ops[..ops.len as usize]
        );
    }

    #[test]
    fn test_scanline_kinds() {
        assert_eq!(ScanlineKind::of(-1), ScanlineKind::PreRender);
        assert_eq!(ScanlineKind::of(0), ScanlineKind::Visible);
        assert_eq!(ScanlineKind::of(239), ScanlineKind::Visible);
        assert_eq!(ScanlineKind::of(240), ScanlineKind::Idle);
        assert_eq!(ScanlineKind::of(300), ScanlineKind::Idle);
    }

    #[test]
    fn test_background_fetch_pipeline() {
        for dot in 1..=256u16 {
            let kind = ScanlineKind::Visible;
            assert_has(kind, dot, PpuOperation::ShiftRegisters);
            match dot % 8 {
                0 => {
                    assert_has(kind, dot, PpuOperation::LoadBackgroundRegisters);
                    assert_has(kind, dot, PpuOperation::IncCoarseX);
                }
                1 => assert_has(kind, dot, PpuOperation::FetchNameTable),
                3 => assert_has(kind, dot, PpuOperation::FetchAttribute),
                5 => assert_has(kind, dot, PpuOperation::FetchTileLow),
                7 => assert_has(kind, dot, PpuOperation::FetchTileHigh),
                _ => {}
            }
        }
        for dot in 257..=320u16 {
            assert_not(ScanlineKind::Visible, dot, PpuOperation::ShiftRegisters);
            assert_not(ScanlineKind::Visible, dot, PpuOperation::IncCoarseX);
        }
    }

    #[test]
    fn test_render_only_on_visible_dots() {
        for dot in 1..=256u16 {
            assert_has(ScanlineKind::Visible, dot, PpuOperation::RenderPixel);
            assert_not(ScanlineKind::PreRender, dot, PpuOperation::RenderPixel);
        }
        for dot in [0u16, 257, 320, 340] {
            assert_not(ScanlineKind::Visible, dot, PpuOperation::RenderPixel);
        }
    }

    #[test]
    fn test_render_pixel_runs_before_shift() {
        let ops = dot_operations(ScanlineKind::Visible, 8);
        let order: Vec<_> = ops.iter().collect();
        let render = order.iter().position(|&o| o == PpuOperation::RenderPixel);
        let shift = order.iter().position(|&o| o == PpuOperation::ShiftRegisters);
        let load = order
            .iter()
            .position(|&o| o == PpuOperation::LoadBackgroundRegisters);
        assert!(render < shift && shift < load);
    }

    #[test]
    fn test_sprite_windows() {
        for dot in 1..=64u16 {
            assert_has(ScanlineKind::Visible, dot, PpuOperation::ClearSecondaryOam);
            assert_not(ScanlineKind::PreRender, dot, PpuOperation::ClearSecondaryOam);
        }
        for dot in 65..=256u16 {
            assert_has(ScanlineKind::Visible, dot, PpuOperation::EvaluateSprites);
            assert_not(ScanlineKind::PreRender, dot, PpuOperation::EvaluateSprites);
        }
        for dot in 257..=320u16 {
            assert_has(ScanlineKind::Visible, dot, PpuOperation::FetchSprites);
            assert_has(ScanlineKind::PreRender, dot, PpuOperation::FetchSprites);
        }
    }

    #[test]
    fn test_scroll_timing() {
        for kind in [ScanlineKind::Visible, ScanlineKind::PreRender] {
            assert_has(kind, 256, PpuOperation::IncFineY);
            assert_has(kind, 257, PpuOperation::CopyHorizV);
        }
        for dot in 280..=304u16 {
            assert_has(ScanlineKind::PreRender, dot, PpuOperation::CopyVertV);
            assert_not(ScanlineKind::Visible, dot, PpuOperation::CopyVertV);
        }
    }

    #[test]
    fn test_idle_lines_do_nothing() {
        for dot in 0..341u16 {
            assert_eq!(dot_operations(ScanlineKind::Idle, dot).len, 0);
        }
    }
}
