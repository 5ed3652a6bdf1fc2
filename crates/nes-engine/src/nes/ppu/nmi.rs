use crate::trace_ppu_event;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NmiEvent {
    /// Vblank flag raised at the start of the vblank scanline
    VBlankSet,
    /// Vblank flag dropped on the pre-render line
    VBlankCleared,
    /// $2000 bit 7 written
    EnableChanged(bool),
    /// $2002 read one dot before the flag would be raised
    StatusReadBeforeVBlank,
    /// $2002 read cleared the vblank flag
    StatusReadClearsVBlank,
}

/// Output level of the PPU's /NMI pin: vblank AND enable. The CPU does
/// its own edge detection.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NmiLine {
    enabled: bool,
    vblank: bool,
    suppress_next_vblank: bool,
    level: bool,
}

impl NmiLine {
    #[inline]
    pub fn level(&self) -> bool {
        self.level
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn vblank(&self) -> bool {
        self.vblank
    }

    /// True while a $2002 read has cancelled the upcoming vblank.
    pub fn vblank_suppressed(&self) -> bool {
        self.suppress_next_vblank
    }

    pub fn on_event(&mut self, event: NmiEvent) {
        match event {
            NmiEvent::VBlankSet => {
                if !self.suppress_next_vblank {
                    self.vblank = true;
                }
                self.suppress_next_vblank = false;
            }
            NmiEvent::VBlankCleared | NmiEvent::StatusReadClearsVBlank => {
                self.vblank = false;
                self.suppress_next_vblank = false;
            }
            NmiEvent::EnableChanged(enabled) => self.enabled = enabled,
            NmiEvent::StatusReadBeforeVBlank => self.suppress_next_vblank = true,
        }
        self.update_level(event);
    }

    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    fn update_level(&mut self, event: NmiEvent) {
        let level = self.enabled && self.vblank;
        if level != self.level {
            self.level = level;
            trace_ppu_event!(
                "[NMI LINE {}] after {:?} enabled={} vblank={}",
                if level { "HIGH" } else { "LOW" },
                event,
                self.enabled,
                self.vblank
            );
        }
    }

    pub(super) fn restore(&mut self, enabled: bool, vblank: bool, suppress_next_vblank: bool) {
        self.enabled = enabled;
        self.vblank = vblank;
        self.suppress_next_vblank = suppress_next_vblank;
        self.level = enabled && vblank;
    }
}
