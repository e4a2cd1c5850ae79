use crate::error::{Error, Result};
use std::fmt;

/// Storage statistics of an LMDB environment.
#[derive(Debug, Clone)]
pub struct DbHealth {
    pub path: String,
    /// Bytes used on disk, not the reserved map size.
    pub disk_size: u64,
    pub entry_counts: Vec<(&'static str, u64)>,
}

impl DbHealth {
    pub fn entries(&self, table: &str) -> Option<u64> {
        self.entry_counts
            .iter()
            .find(|(name, _)| *name == table)
            .map(|(_, count)| *count)
    }
}

impl fmt::Display for DbHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "index: {}", self.path)?;
        writeln!(f, "disk size: {} bytes", self.disk_size)?;
        for (table, count) in &self.entry_counts {
            writeln!(f, "{table}: {count}")?;
        }
        Ok(())
    }
}

pub trait DbHealthChecker {
    fn get_env(&self) -> &heed::Env;
    fn count_entries(&self) -> Result<Vec<(&'static str, u64)>>;

    fn get_health(&self) -> Result<DbHealth> {
        let env = self.get_env();

        let disk_size = env.real_disk_size().map_err(Error::DbRead)?;
        let path = env.path().to_string_lossy().to_string();
        let entry_counts = self.count_entries()?;

        Ok(DbHealth {
            path,
            disk_size,
            entry_counts,
        })
    }
}
