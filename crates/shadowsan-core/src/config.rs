//! Runtime flag configuration.
//!
//! Flags come from the `SHADOWSAN_OPTIONS` environment variable as `key=value`
//! pairs separated by spaces, `:` or `,`:
//!
//! ```text
//! SHADOWSAN_OPTIONS="redzone=64:mt=0 quarantine_size=0x1000000"
//! ```
//!
//! The parsed [`RuntimeFlags`] are immutable. The process-wide copy is built on
//! first use by [`runtime_flags`] and passed by reference from then on.

use std::sync::OnceLock;

use crate::counter::ThreadSafety;
use crate::error::FlagError;
use crate::granule::{DEFAULT_GRANULARITY, Granularity};

/// Environment variable holding the flag string.
pub const OPTIONS_ENV: &str = "SHADOWSAN_OPTIONS";

/// Smallest accepted redzone, also the global/stack redzone unit.
pub const MIN_REDZONE: usize = 32;

/// Immutable settings consumed by the engine and its drivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeFlags {
    /// Bytes of freed heap kept poisoned before reuse.
    pub quarantine_size: usize,
    /// Bytes of padding per heap allocation.
    pub redzone: usize,
    /// Whether counters must be thread-safe.
    pub mt: bool,
    /// Diagnostic verbosity.
    pub verbosity: u32,
    pub debug: u32,
    pub symbolize: bool,
    pub demangle: u32,
    pub poison_shadow: bool,
    /// Frames captured per allocation stack.
    pub malloc_context_size: usize,
    /// Print statistics at exit (non-zero).
    pub stats: u32,
    /// Intercept string functions (consumed by the allocator interception layer).
    pub replace_str: bool,
    /// Intercept memory intrinsics (consumed by the allocator interception layer).
    pub replace_intrin: bool,
    /// Serve `stack_malloc` from a fake stack.
    pub use_fake_stack: bool,
    pub granularity: Granularity,
}

impl Default for RuntimeFlags {
    fn default() -> Self {
        Self {
            quarantine_size: 1 << 28,
            redzone: 128,
            mt: true,
            verbosity: 0,
            debug: 0,
            symbolize: true,
            demangle: 1,
            poison_shadow: true,
            malloc_context_size: 30,
            stats: 0,
            replace_str: true,
            replace_intrin: true,
            use_fake_stack: true,
            granularity: DEFAULT_GRANULARITY,
        }
    }
}

impl RuntimeFlags {
    /// Parse a flag string on top of the defaults and validate the result.
    pub fn parse(raw: &str) -> Result<Self, FlagError> {
        let mut flags = Self::default();
        for token in raw
            .split(|c: char| c.is_ascii_whitespace() || c == ':' || c == ',')
            .filter(|t| !t.is_empty())
        {
            let (key, value) = token.split_once('=').ok_or_else(|| FlagError::Malformed {
                token: token.to_string(),
            })?;
            flags.apply(key.trim(), value.trim())?;
        }
        flags.validate()?;
        Ok(flags)
    }

    /// Read and parse [`OPTIONS_ENV`]. An unset variable yields the defaults.
    pub fn from_env() -> Result<Self, FlagError> {
        match std::env::var(OPTIONS_ENV) {
            Ok(raw) => Self::parse(&raw),
            Err(_) => Ok(Self::default()),
        }
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<(), FlagError> {
        let invalid = || FlagError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        };
        match key {
            "quarantine_size" => self.quarantine_size = parse_int(value).ok_or_else(invalid)?,
            "redzone" => self.redzone = parse_int(value).ok_or_else(invalid)?,
            "mt" => self.mt = parse_bool(value).ok_or_else(invalid)?,
            "v" | "verbosity" => self.verbosity = parse_u32(value).ok_or_else(invalid)?,
            "debug" => self.debug = parse_u32(value).ok_or_else(invalid)?,
            "symbolize" => self.symbolize = parse_bool(value).ok_or_else(invalid)?,
            "demangle" => self.demangle = parse_u32(value).ok_or_else(invalid)?,
            "poison_shadow" => self.poison_shadow = parse_bool(value).ok_or_else(invalid)?,
            "malloc_context_size" => {
                self.malloc_context_size = parse_int(value).ok_or_else(invalid)?;
            }
            "stats" => self.stats = parse_u32(value).ok_or_else(invalid)?,
            "replace_str" => self.replace_str = parse_bool(value).ok_or_else(invalid)?,
            "replace_intrin" => self.replace_intrin = parse_bool(value).ok_or_else(invalid)?,
            "use_fake_stack" => self.use_fake_stack = parse_bool(value).ok_or_else(invalid)?,
            "granularity" => {
                self.granularity = Granularity::new(parse_int(value).ok_or_else(invalid)?)?;
            }
            _ => {
                return Err(FlagError::UnknownFlag {
                    key: key.to_string(),
                });
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), FlagError> {
        if self.redzone < MIN_REDZONE || !self.redzone.is_power_of_two() {
            return Err(FlagError::InvalidRedzone {
                bytes: self.redzone,
                min: MIN_REDZONE,
            });
        }
        if self.redzone < self.granularity.bytes() {
            return Err(FlagError::RedzoneBelowGranularity {
                redzone: self.redzone,
                granularity: self.granularity.bytes(),
            });
        }
        Ok(())
    }

    /// Counter mode implied by `mt`.
    #[must_use]
    pub const fn thread_safety(&self) -> ThreadSafety {
        ThreadSafety::from_mt_flag(self.mt)
    }

    /// Redzone unit for globals and stack frames: [`MIN_REDZONE`], widened to
    /// the granule size when granules are larger.
    #[must_use]
    pub const fn frame_redzone(&self) -> usize {
        let g = self.granularity.bytes();
        if g > MIN_REDZONE { g } else { MIN_REDZONE }
    }
}

fn parse_int(raw: &str) -> Option<usize> {
    let cleaned = raw.replace('_', "");
    match cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
    {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => cleaned.parse().ok(),
    }
}

fn parse_u32(raw: &str) -> Option<u32> {
    parse_int(raw).and_then(|v| u32::try_from(v).ok())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

static FLAGS: OnceLock<RuntimeFlags> = OnceLock::new();

/// Process-wide flags, parsed from the environment on first call.
///
/// A malformed flag string is fatal.
pub fn runtime_flags() -> &'static RuntimeFlags {
    FLAGS.get_or_init(|| match RuntimeFlags::from_env() {
        Ok(flags) => flags,
        Err(err) => crate::check::check_failed(&err.to_string(), file!(), line!()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::granule::WIDE_GRANULARITY;

    #[test]
    fn empty_string_gives_defaults() {
        let flags = RuntimeFlags::parse("").unwrap();
        assert_eq!(flags, RuntimeFlags::default());
        assert_eq!(flags.quarantine_size, 1 << 28);
        assert_eq!(flags.redzone, 128);
        assert!(flags.mt);
        assert_eq!(flags.malloc_context_size, 30);
        assert_eq!(flags.granularity.bytes(), 8);
    }

    #[test]
    fn mixed_separators() {
        let flags =
            RuntimeFlags::parse("redzone=64:mt=0 quarantine_size=0x1000,v=2 stats=1").unwrap();
        assert_eq!(flags.redzone, 64);
        assert!(!flags.mt);
        assert_eq!(flags.quarantine_size, 0x1000);
        assert_eq!(flags.verbosity, 2);
        assert_eq!(flags.stats, 1);
        assert_eq!(flags.thread_safety(), ThreadSafety::Single);
    }

    #[test]
    fn boolean_spellings() {
        for (raw, want) in [("1", true), ("YES", true), ("off", false), ("False", false)] {
            let flags = RuntimeFlags::parse(&format!("replace_str={raw}")).unwrap();
            assert_eq!(flags.replace_str, want, "{raw}");
        }
    }

    #[test]
    fn rejects_unknown_and_malformed() {
        assert_eq!(
            RuntimeFlags::parse("nope=1"),
            Err(FlagError::UnknownFlag {
                key: "nope".to_string()
            })
        );
        assert_eq!(
            RuntimeFlags::parse("mt"),
            Err(FlagError::Malformed {
                token: "mt".to_string()
            })
        );
        assert_eq!(
            RuntimeFlags::parse("mt=maybe"),
            Err(FlagError::InvalidValue {
                key: "mt".to_string(),
                value: "maybe".to_string()
            })
        );
    }

    #[test]
    fn redzone_constraints() {
        assert_eq!(
            RuntimeFlags::parse("redzone=16"),
            Err(FlagError::InvalidRedzone { bytes: 16, min: 32 })
        );
        assert_eq!(
            RuntimeFlags::parse("redzone=48"),
            Err(FlagError::InvalidRedzone { bytes: 48, min: 32 })
        );
        assert_eq!(
            RuntimeFlags::parse("granularity=128 redzone=64"),
            Err(FlagError::RedzoneBelowGranularity {
                redzone: 64,
                granularity: 128
            })
        );
    }

    #[test]
    fn wide_granularity_widens_frame_redzone() {
        let flags = RuntimeFlags::parse("granularity=128").unwrap();
        assert_eq!(flags.granularity, WIDE_GRANULARITY);
        assert_eq!(flags.frame_redzone(), 128);
        assert_eq!(RuntimeFlags::default().frame_redzone(), 32);
    }

    #[test]
    fn rejects_bad_granularity() {
        assert_eq!(
            RuntimeFlags::parse("granularity=12"),
            Err(FlagError::InvalidGranularity { bytes: 12 })
        );
    }
}
