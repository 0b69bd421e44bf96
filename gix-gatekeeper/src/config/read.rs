use bstr::ByteSlice;
use gix_config::File;

use super::patterns::RefPatterns;
use crate::Error;

/// Typed access to option values, turning malformed values into configuration errors that
/// name the option and its raw value.
pub(crate) struct Reader<'a, 'event> {
    file: &'a File<'event>,
}

impl<'a, 'event> Reader<'a, 'event> {
    pub(crate) fn new(file: &'a File<'event>) -> Self {
        Reader { file }
    }

    fn raw(&self, key: &str) -> String {
        self.string(key).unwrap_or_default()
    }

    /// The last value of `key`.
    pub(crate) fn string(&self, key: &str) -> Option<String> {
        self.file.string(key).map(|v| v.to_str_lossy().trim().to_owned())
    }

    /// All values of `key`, each split at commas, without empty entries.
    pub(crate) fn list(&self, key: &str) -> Vec<String> {
        self.file
            .strings(key)
            .unwrap_or_default()
            .iter()
            .flat_map(|v| {
                v.to_str_lossy()
                    .split(',')
                    .map(|item| item.trim().to_owned())
                    .filter(|item| !item.is_empty())
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// All values of `key` as anchored reference patterns, one pattern per value.
    pub(crate) fn patterns(&self, key: &str, default: &[&str]) -> Result<RefPatterns, Error> {
        match self.file.strings(key) {
            Some(values) => {
                let sources: Vec<String> = values
                    .iter()
                    .map(|v| v.to_str_lossy().trim().to_owned())
                    .filter(|v| !v.is_empty())
                    .collect();
                RefPatterns::new(key, sources)
            }
            None => RefPatterns::new(key, default),
        }
    }

    pub(crate) fn boolean(&self, key: &str, default: bool) -> Result<bool, Error> {
        match self.file.boolean(key) {
            Some(Ok(value)) => Ok(value),
            Some(Err(err)) => Err(Error::configuration(key, self.raw(key), format!("invalid boolean value: {err}"))),
            None => Ok(default),
        }
    }

    pub(crate) fn integer(&self, key: &str, default: i64) -> Result<i64, Error> {
        match self.file.integer(key) {
            Some(Ok(value)) => Ok(value),
            Some(Err(err)) => Err(Error::configuration(key, self.raw(key), format!("invalid integer value: {err}"))),
            None => Ok(default),
        }
    }

    /// An integer where zero or negative values disable the associated limit.
    pub(crate) fn limit(&self, key: &str, default: i64) -> Result<Option<usize>, Error> {
        let value = self.integer(key, default)?;
        Ok(usize::try_from(value).ok().filter(|v| *v > 0))
    }

    /// A non-negative integer.
    pub(crate) fn count(&self, key: &str, default: i64) -> Result<usize, Error> {
        let value = self.integer(key, default)?;
        usize::try_from(value).map_err(|_| Error::configuration(key, self.raw(key), "must not be negative"))
    }
}
