//! Fault classification and error report rendering.

use std::fmt;

use shadowsan_core::{GranuleState, Granularity, ShadowMagic, WIDE_SENTINEL, decode_granule};

use crate::shadow::{ROW_BYTES, ShadowMap, ShadowRow};

/// Rows of shadow printed on each side of the faulting row.
const NEIGHBORHOOD_ROWS: usize = 2;

/// Class of a detected memory error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BugKind {
    HeapBufferOverflow,
    HeapUseAfterFree,
    StackBufferUnderflow,
    StackBufferOverflow,
    StackUseAfterReturn,
    GlobalBufferOverflow,
    /// The shadow byte carries no classification (wide sentinel, corrupted
    /// shadow, or a fault reported on addressable memory).
    UnknownCrash,
}

impl BugKind {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::HeapBufferOverflow => "heap-buffer-overflow",
            Self::HeapUseAfterFree => "heap-use-after-free",
            Self::StackBufferUnderflow => "stack-buffer-underflow",
            Self::StackBufferOverflow => "stack-buffer-overflow",
            Self::StackUseAfterReturn => "stack-use-after-return",
            Self::GlobalBufferOverflow => "global-buffer-overflow",
            Self::UnknownCrash => "unknown-crash",
        }
    }

    /// Bug class implied by a magic value.
    #[must_use]
    pub const fn from_magic(magic: ShadowMagic) -> Self {
        match magic {
            ShadowMagic::HeapLeftRedzone | ShadowMagic::HeapRightRedzone => {
                Self::HeapBufferOverflow
            }
            ShadowMagic::HeapFreed => Self::HeapUseAfterFree,
            ShadowMagic::StackLeftRedzone => Self::StackBufferUnderflow,
            ShadowMagic::StackMidRedzone
            | ShadowMagic::StackRightRedzone
            | ShadowMagic::StackPartialRedzone => Self::StackBufferOverflow,
            ShadowMagic::StackAfterReturn => Self::StackUseAfterReturn,
            ShadowMagic::GlobalRedzone => Self::GlobalBufferOverflow,
        }
    }
}

impl fmt::Display for BugKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Classify the fault at `bad_addr`.
///
/// A partial granule says nothing about why its tail is unaddressable, so the
/// following granule's byte is used instead. Returns the kind and the shadow
/// byte it was derived from.
#[must_use]
pub fn classify(shadow: &ShadowMap, bad_addr: usize) -> (BugKind, u8) {
    let g = shadow.granularity();
    let mut byte = shadow.load(bad_addr);
    if matches!(decode_granule(byte, g), GranuleState::Partial(_)) {
        byte = shadow.load(bad_addr.saturating_add(g.bytes()));
    }
    let kind = match decode_granule(byte, g) {
        GranuleState::Poisoned(magic) => BugKind::from_magic(magic),
        _ => BugKind::UnknownCrash,
    };
    (kind, byte)
}

/// The faulting access as reported by instrumented code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessInfo {
    pub addr: usize,
    pub is_write: bool,
    pub size: usize,
}

impl AccessInfo {
    /// Build from the ABI's `log2(access size)` encoding.
    #[must_use]
    pub fn from_log_size(addr: usize, is_write: bool, log_access_size: u32) -> Self {
        Self {
            addr,
            is_write,
            size: 1_usize.checked_shl(log_access_size).unwrap_or(0),
        }
    }
}

/// A classified memory error, ready to print.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub access: AccessInfo,
    pub bug: BugKind,
    /// First unaddressable byte of the access (the access address when the
    /// whole access looks addressable).
    pub bad_addr: usize,
    /// Shadow byte the classification was derived from.
    pub shadow_byte: u8,
    /// Human-readable location (global, freed chunk, returned frame).
    pub location: Option<String>,
    pub granularity: Granularity,
    pub neighborhood: Vec<ShadowRow>,
}

impl ErrorReport {
    /// Classify an access against `shadow`.
    #[must_use]
    pub fn build(shadow: &ShadowMap, access: AccessInfo) -> Self {
        let bad_addr = shadow
            .first_poisoned(access.addr, access.size.max(1))
            .unwrap_or(access.addr);
        let (bug, shadow_byte) = classify(shadow, bad_addr);
        Self {
            access,
            bug,
            bad_addr,
            shadow_byte,
            location: None,
            granularity: shadow.granularity(),
            neighborhood: shadow.neighborhood(bad_addr, NEIGHBORHOOD_ROWS),
        }
    }

    #[must_use]
    pub fn with_location(mut self, location: Option<String>) -> Self {
        self.location = location;
        self
    }
}

fn fmt_addr(addr: usize) -> String {
    format!("0x{addr:012x}")
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "=".repeat(65))?;
        writeln!(
            f,
            "==shadowsan==ERROR: {} on address {}",
            self.bug,
            fmt_addr(self.access.addr)
        )?;
        writeln!(
            f,
            "{} of size {} at {}",
            if self.access.is_write { "WRITE" } else { "READ" },
            self.access.size,
            fmt_addr(self.access.addr)
        )?;
        if let Some(location) = &self.location {
            writeln!(f, "{location}")?;
        }

        let g = self.granularity.bytes();
        let row_span = ROW_BYTES * g;
        let bad_row = self.bad_addr - self.bad_addr % row_span;
        let bad_col = (self.bad_addr % row_span) / g;
        writeln!(f, "Shadow bytes around the buggy address:")?;
        for row in &self.neighborhood {
            let marker = if row.app_addr == bad_row { "=>" } else { "  " };
            write!(f, "{marker}{}:", fmt_addr(row.app_addr))?;
            for (col, byte) in row.bytes.iter().enumerate() {
                if row.app_addr == bad_row && col == bad_col {
                    write!(f, "[{byte:02x}]")?;
                } else if row.app_addr == bad_row && col == bad_col + 1 {
                    write!(f, "{byte:02x}")?;
                } else {
                    write!(f, " {byte:02x}")?;
                }
            }
            writeln!(f)?;
        }
        f.write_str(&shadow_legend(self.granularity))
    }
}

/// Legend printed under every shadow dump.
#[must_use]
pub fn shadow_legend(granularity: Granularity) -> String {
    let g = granularity.bytes();
    let mut out = format!(
        "Shadow byte legend (one shadow byte represents {g} application bytes):\n"
    );
    out.push_str(&format!("  {:<24}00\n", "Addressable:"));
    let partial: Vec<String> = if g <= 8 {
        (1..g).map(|v| format!("{v:02x}")).collect()
    } else {
        vec![format!("01..{:02x}", g - 1)]
    };
    out.push_str(&format!(
        "  {:<24}{}\n",
        "Partially addressable:",
        partial.join(" ")
    ));
    for magic in ShadowMagic::ALL {
        out.push_str(&format!(
            "  {:<24}{:02x}\n",
            format!("{}:", magic.label()),
            magic.byte()
        ));
    }
    if granularity.is_wide() {
        out.push_str(&format!("  {:<24}{WIDE_SENTINEL:02x}\n", "Unaddressable (wide):"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use shadowsan_core::{DEFAULT_GRANULARITY, WIDE_GRANULARITY};

    #[test]
    fn every_magic_maps_to_its_bug_kind() {
        let shadow = ShadowMap::new(DEFAULT_GRANULARITY);
        for (idx, magic) in ShadowMagic::ALL.into_iter().enumerate() {
            let addr = 0x10_000 + idx * 0x100;
            shadow.poison(addr, 8, magic).unwrap();
            let (kind, byte) = classify(&shadow, addr);
            assert_eq!(kind, BugKind::from_magic(magic));
            assert_eq!(kind.name(), magic.bug_kind());
            assert_eq!(byte, magic.byte());
        }
    }

    #[test]
    fn partial_granule_defers_to_next_byte() {
        let shadow = ShadowMap::new(DEFAULT_GRANULARITY);
        shadow
            .poison_redzone(0x2000, 3, 32, ShadowMagic::GlobalRedzone)
            .unwrap();
        assert_eq!(
            classify(&shadow, 0x2005),
            (BugKind::GlobalBufferOverflow, 0xf9)
        );
    }

    #[test]
    fn wide_sentinel_is_unknown_crash() {
        let shadow = ShadowMap::new(WIDE_GRANULARITY);
        shadow
            .poison(0x4000, 128, ShadowMagic::HeapFreed)
            .unwrap();
        assert_eq!(classify(&shadow, 0x4000), (BugKind::UnknownCrash, 0xff));
    }

    #[test]
    fn report_for_heap_overflow() {
        let shadow = ShadowMap::new(DEFAULT_GRANULARITY);
        shadow
            .poison_redzone(0x6000, 10, 32, ShadowMagic::HeapRightRedzone)
            .unwrap();
        let report = ErrorReport::build(&shadow, AccessInfo::from_log_size(0x6008, true, 2));
        assert_eq!(report.access.size, 4);
        assert_eq!(report.bad_addr, 0x600a);
        assert_eq!(report.bug, BugKind::HeapBufferOverflow);
        assert_eq!(report.shadow_byte, 0xfb);

        let text = report.to_string();
        assert!(text.contains("ERROR: heap-buffer-overflow on address 0x000000006008"));
        assert!(text.contains("WRITE of size 4 at 0x000000006008"));
        assert!(text.contains("=>0x000000006000: 00[02]fb fb"));
        assert!(text.contains("Heap right redzone:"));
    }

    #[test]
    fn report_on_clean_memory_is_unknown() {
        let shadow = ShadowMap::new(DEFAULT_GRANULARITY);
        let report = ErrorReport::build(&shadow, AccessInfo::from_log_size(0x9000, false, 0));
        assert_eq!(report.bug, BugKind::UnknownCrash);
        assert_eq!(report.bad_addr, 0x9000);
        assert!(report.to_string().contains("READ of size 1"));
    }

    #[test]
    fn legend_lists_every_category() {
        let legend = shadow_legend(DEFAULT_GRANULARITY);
        assert!(legend.contains("01 02 03 04 05 06 07"));
        for magic in ShadowMagic::ALL {
            assert!(legend.contains(&format!("{:02x}", magic.byte())));
        }
        assert!(shadow_legend(WIDE_GRANULARITY).contains("01..7f"));
    }
}
