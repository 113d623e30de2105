//! Run configuration: output/debug flags and TOML parameter files.
//!
//! A configuration file looks like
//! ```toml
//! J = 1.0
//! ny = 2
//! boundary_h = 0.25
//!
//! [chain]
//! ns = 8
//! spin = 1        # total spin in halves
//!
//! [context]
//! print_data = false
//! print_scale = 1e-10
//! debug = false
//! ```
//! Every key is optional and falls back to its default.

use std::path::Path;
use thiserror::Error;
use toml::{ Table, Value };
use crate::{ hams::heisenberg::HeisenbergParams, spin::SpinTotal };

#[derive(Debug, Error)]
pub enum ConfigError {
    /// Returned when a configuration file can't be read.
    #[error("couldn't read config file: {0}")]
    Read(#[from] std::io::Error),

    /// Returned when a configuration file isn't valid TOML.
    #[error("couldn't parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Returned when a key holds a value of the wrong type.
    #[error("config key '{key}' must be {expected}")]
    BadType { key: String, expected: &'static str },

    /// Returned when a key holds a value outside its allowed range.
    #[error("config key '{key}' out of range: {reason}")]
    OutOfRange { key: String, reason: &'static str },
}
use ConfigError::*;
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Output and diagnostics flags, passed explicitly to whatever needs them.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Context {
    /// Print tensor elements in addition to index lists.
    pub print_data: bool,
    /// Elements with magnitude at or below this are omitted from printouts.
    pub print_scale: f64,
    /// Emit a `trace`-level log record for every term placed in a tensor.
    pub debug: bool,
}

impl Default for Context {
    fn default() -> Self {
        Self { print_data: false, print_scale: 1e-10, debug: false }
    }
}

impl Context {
    fn from_table(table: &Table) -> ConfigResult<Self> {
        let def = Self::default();
        Ok(Self {
            print_data: get_bool(table, "print_data")?.unwrap_or(def.print_data),
            print_scale: get_f64(table, "print_scale")?.unwrap_or(def.print_scale),
            debug: get_bool(table, "debug")?.unwrap_or(def.debug),
        })
    }
}

/// Size and site type of a uniform spin chain.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ChainConfig {
    /// Number of sites.
    pub ns: usize,
    /// Total spin of every site.
    pub spin: SpinTotal,
}

impl Default for ChainConfig {
    fn default() -> Self { Self { ns: 4, spin: SpinTotal::HALF } }
}

impl ChainConfig {
    fn from_table(table: &Table) -> ConfigResult<Self> {
        let def = Self::default();
        let ns = get_usize(table, "ns")?.unwrap_or(def.ns);
        if ns == 0 {
            return Err(OutOfRange { key: "ns".into(), reason: "must be positive" });
        }
        let spin
            = get_usize(table, "spin")?
            .map(|j| {
                u32::try_from(j)
                    .ok()
                    .filter(|&j| j > 0)
                    .map(SpinTotal::new)
                    .ok_or(OutOfRange {
                        key: "spin".into(),
                        reason: "must be a positive number of halves",
                    })
            })
            .transpose()?
            .unwrap_or(def.spin);
        Ok(Self { ns, spin })
    }
}

/// Everything needed for a single compilation run.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Config {
    pub chain: ChainConfig,
    pub params: HeisenbergParams,
    pub context: Context,
}

impl Config {
    /// Parse a configuration from TOML source.
    pub fn from_toml(src: &str) -> ConfigResult<Self> {
        let table: Table = src.parse()?;
        let chain
            = sub_table(&table, "chain")?
            .map(ChainConfig::from_table)
            .transpose()?
            .unwrap_or_default();
        let context
            = sub_table(&table, "context")?
            .map(Context::from_table)
            .transpose()?
            .unwrap_or_default();
        let params = HeisenbergParams::from_table(&table)?;
        Ok(Self { chain, params, context })
    }

    /// Read and parse a configuration file.
    pub fn from_file<P>(path: P) -> ConfigResult<Self>
    where P: AsRef<Path>
    {
        let src = std::fs::read_to_string(path)?;
        Self::from_toml(&src)
    }
}

fn sub_table<'a>(table: &'a Table, key: &str) -> ConfigResult<Option<&'a Table>> {
    match table.get(key) {
        None => Ok(None),
        Some(Value::Table(t)) => Ok(Some(t)),
        Some(_) => Err(BadType { key: key.into(), expected: "a table" }),
    }
}

pub(crate) fn get_f64(table: &Table, key: &str) -> ConfigResult<Option<f64>> {
    match table.get(key) {
        None => Ok(None),
        Some(Value::Float(x)) => Ok(Some(*x)),
        Some(Value::Integer(i)) => Ok(Some(*i as f64)),
        Some(_) => Err(BadType { key: key.into(), expected: "a number" }),
    }
}

pub(crate) fn get_usize(table: &Table, key: &str) -> ConfigResult<Option<usize>> {
    match table.get(key) {
        None => Ok(None),
        Some(Value::Integer(i)) => {
            usize::try_from(*i)
                .map(Some)
                .map_err(|_| OutOfRange { key: key.into(), reason: "must be non-negative" })
        },
        Some(_) => Err(BadType { key: key.into(), expected: "an integer" }),
    }
}

pub(crate) fn get_bool(table: &Table, key: &str) -> ConfigResult<Option<bool>> {
    match table.get(key) {
        None => Ok(None),
        Some(Value::Boolean(b)) => Ok(Some(*b)),
        Some(_) => Err(BadType { key: key.into(), expected: "a boolean" }),
    }
}
