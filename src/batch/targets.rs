//! Expansion of host and file specifications into work sequences.
//!
//! A host specification is either one IPv4 address or the path of a host
//! list file. Each line of that file is an address or an inclusive
//! `first-last` range; ranges are kept as two integers and walked lazily so
//! a `/8` costs no more memory than a single host.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::net::Ipv4Addr;
use std::path::Path;

use crate::tftp::core::TftpError;

/// Inclusive range of IPv4 addresses, `first <= last`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRange {
    first: u32,
    last: u32,
}

impl AddressRange {
    /// Returns `None` when `first` is numerically above `last`.
    pub fn new(first: Ipv4Addr, last: Ipv4Addr) -> Option<Self> {
        let (first, last) = (u32::from(first), u32::from(last));
        (first <= last).then_some(Self { first, last })
    }

    pub fn first(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.first)
    }

    pub fn last(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.last)
    }

    pub fn len(&self) -> u64 {
        u64::from(self.last - self.first) + 1
    }

    /// Always `false`: a range holds at least `first`.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        (self.first..=self.last).contains(&u32::from(addr))
    }

    /// Ascending iteration, produced on demand.
    pub fn iter(&self) -> impl Iterator<Item = Ipv4Addr> + use<> {
        (self.first..=self.last).map(Ipv4Addr::from)
    }
}

/// Ordered singles followed by ordered ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetList {
    singles: Vec<Ipv4Addr>,
    ranges: Vec<AddressRange>,
}

impl TargetList {
    pub fn single(addr: Ipv4Addr) -> Self {
        Self {
            singles: vec![addr],
            ranges: Vec::new(),
        }
    }

    /// Builds the target list from a host specification: an IPv4 address, or
    /// otherwise the path of a host list file.
    pub fn from_spec(spec: &str) -> Result<Self, TftpError> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(TftpError::config("Host address cannot be empty"));
        }
        if let Ok(addr) = spec.parse::<Ipv4Addr>() {
            return Ok(Self::single(addr));
        }

        let file = File::open(Path::new(spec)).map_err(|e| {
            TftpError::config(format!(
                "'{}' is neither an IPv4 address nor a readable host list: {}",
                spec, e
            ))
        })?;
        Self::parse(BufReader::new(file))
            .map_err(|e| TftpError::config(format!("Cannot read host list {}: {}", spec, e)))
    }

    /// Parses host list lines. Invalid lines and reversed ranges are skipped.
    pub fn parse<R: BufRead>(reader: R) -> std::io::Result<Self> {
        let mut list = Self::default();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if !list.push_line(line) {
                log::warn!("Ignoring host list line {}: '{}'", idx + 1, line);
            }
        }
        Ok(list)
    }

    fn push_line(&mut self, line: &str) -> bool {
        if let Ok(addr) = line.parse::<Ipv4Addr>() {
            self.singles.push(addr);
            return true;
        }

        let tokens: Vec<&str> = line.split('-').collect();
        let [first, last] = tokens.as_slice() else {
            return false;
        };
        match (first.trim().parse(), last.trim().parse()) {
            (Ok(first), Ok(last)) => match AddressRange::new(first, last) {
                Some(range) => {
                    self.ranges.push(range);
                    true
                }
                None => false,
            },
            _ => false,
        }
    }

    pub fn singles(&self) -> &[Ipv4Addr] {
        &self.singles
    }

    pub fn ranges(&self) -> &[AddressRange] {
        &self.ranges
    }

    /// Total number of addresses, counting every member of every range.
    pub fn len(&self) -> u64 {
        self.singles.len() as u64 + self.ranges.iter().map(AddressRange::len).sum::<u64>()
    }

    pub fn is_empty(&self) -> bool {
        self.singles.is_empty() && self.ranges.is_empty()
    }

    /// Singles first, then each range in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = Ipv4Addr> + '_ {
        self.singles
            .iter()
            .copied()
            .chain(self.ranges.iter().flat_map(AddressRange::iter))
    }
}

/// Applies the configured prefix and extension to a manifest entry.
pub fn compose_filename(name: &str, prefix: &str, extension: &str) -> String {
    let extension = extension.trim_start_matches('.');
    if extension.is_empty() {
        format!("{}{}", prefix, name)
    } else {
        format!("{}{}.{}", prefix, name, extension)
    }
}

/// Ordered list of remote filenames, already composed with prefix and
/// extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileManifest {
    names: Vec<String>,
}

impl FileManifest {
    /// A spec naming an existing file is read one filename per line;
    /// anything else is taken as a literal remote filename.
    pub fn from_spec(spec: &str, prefix: &str, extension: &str) -> Result<Self, TftpError> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(TftpError::config("Filename cannot be empty"));
        }

        let path = Path::new(spec);
        if !path.is_file() {
            return Ok(Self::from_names([compose_filename(spec, prefix, extension)]));
        }

        let file = File::open(path)
            .map_err(|e| TftpError::config(format!("Cannot open file list {}: {}", spec, e)))?;
        let manifest = Self::parse(BufReader::new(file), prefix, extension)
            .map_err(|e| TftpError::config(format!("Cannot read file list {}: {}", spec, e)))?;
        if manifest.is_empty() {
            return Err(TftpError::config(format!("File list {} is empty", spec)));
        }
        Ok(manifest)
    }

    pub fn parse<R: BufRead>(reader: R, prefix: &str, extension: &str) -> std::io::Result<Self> {
        let mut names = Vec::new();
        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if !line.is_empty() {
                names.push(compose_filename(line, prefix, extension));
            }
        }
        Ok(Self { names })
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
