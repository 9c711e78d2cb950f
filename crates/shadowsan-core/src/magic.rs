//! Diagnostic magic values written to shadow for fully unaddressable granules.
//!
//! These bytes are a stable contract: debugger extensions and offline shadow
//! dumps decode them with the same table. New categories must take a value
//! outside `0x00..=0x7f`, which is reserved for `0` and partial counts.

/// Why a granule is unaddressable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ShadowMagic {
    HeapLeftRedzone = 0xfa,
    HeapRightRedzone = 0xfb,
    /// Freed heap memory held in quarantine.
    HeapFreed = 0xfd,
    StackLeftRedzone = 0xf1,
    StackMidRedzone = 0xf2,
    StackRightRedzone = 0xf3,
    StackPartialRedzone = 0xf4,
    /// Frame released by `stack_free`.
    StackAfterReturn = 0xf5,
    GlobalRedzone = 0xf9,
}

impl ShadowMagic {
    /// Every category, in legend order.
    pub const ALL: [Self; 9] = [
        Self::HeapLeftRedzone,
        Self::HeapRightRedzone,
        Self::HeapFreed,
        Self::StackLeftRedzone,
        Self::StackMidRedzone,
        Self::StackRightRedzone,
        Self::StackPartialRedzone,
        Self::StackAfterReturn,
        Self::GlobalRedzone,
    ];

    /// Shadow byte value.
    #[must_use]
    pub const fn byte(self) -> u8 {
        self as u8
    }

    /// Parse a shadow byte back into its category.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0xfa => Some(Self::HeapLeftRedzone),
            0xfb => Some(Self::HeapRightRedzone),
            0xfd => Some(Self::HeapFreed),
            0xf1 => Some(Self::StackLeftRedzone),
            0xf2 => Some(Self::StackMidRedzone),
            0xf3 => Some(Self::StackRightRedzone),
            0xf4 => Some(Self::StackPartialRedzone),
            0xf5 => Some(Self::StackAfterReturn),
            0xf9 => Some(Self::GlobalRedzone),
            _ => None,
        }
    }

    /// Legend label, as printed under a shadow dump.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::HeapLeftRedzone => "Heap left redzone",
            Self::HeapRightRedzone => "Heap right redzone",
            Self::HeapFreed => "Freed heap region",
            Self::StackLeftRedzone => "Stack left redzone",
            Self::StackMidRedzone => "Stack mid redzone",
            Self::StackRightRedzone => "Stack right redzone",
            Self::StackPartialRedzone => "Stack partial redzone",
            Self::StackAfterReturn => "Stack after return",
            Self::GlobalRedzone => "Global redzone",
        }
    }

    /// Bug class reported for an access that lands in this category.
    #[must_use]
    pub const fn bug_kind(self) -> &'static str {
        match self {
            Self::HeapLeftRedzone | Self::HeapRightRedzone => "heap-buffer-overflow",
            Self::HeapFreed => "heap-use-after-free",
            Self::StackLeftRedzone => "stack-buffer-underflow",
            Self::StackMidRedzone | Self::StackRightRedzone | Self::StackPartialRedzone => {
                "stack-buffer-overflow"
            }
            Self::StackAfterReturn => "stack-use-after-return",
            Self::GlobalRedzone => "global-buffer-overflow",
        }
    }

    /// Stable kebab-case name used by the harness CLI and fixtures.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::HeapLeftRedzone => "heap-left",
            Self::HeapRightRedzone => "heap-right",
            Self::HeapFreed => "heap-freed",
            Self::StackLeftRedzone => "stack-left",
            Self::StackMidRedzone => "stack-mid",
            Self::StackRightRedzone => "stack-right",
            Self::StackPartialRedzone => "stack-partial",
            Self::StackAfterReturn => "stack-after-return",
            Self::GlobalRedzone => "global",
        }
    }

    /// Parse a [`ShadowMagic::name`] or a hex byte such as `0xfa`.
    #[must_use]
    pub fn from_name(s: &str) -> Option<Self> {
        let lowered = s.trim().to_ascii_lowercase();
        if let Some(hex) = lowered.strip_prefix("0x") {
            return u8::from_str_radix(hex, 16).ok().and_then(Self::from_byte);
        }
        Self::ALL.into_iter().find(|m| m.name() == lowered)
    }
}

impl From<ShadowMagic> for u8 {
    fn from(magic: ShadowMagic) -> Self {
        magic.byte()
    }
}

/// Verify the table invariants: pairwise distinct, none in `0..=0x7f`.
///
/// Returns the first offending value.
pub fn validate_taxonomy(table: &[ShadowMagic]) -> Result<(), u8> {
    for (idx, magic) in table.iter().enumerate() {
        let byte = magic.byte();
        if byte < 0x80 {
            return Err(byte);
        }
        if table[..idx].iter().any(|earlier| earlier.byte() == byte) {
            return Err(byte);
        }
    }
    Ok(())
}
