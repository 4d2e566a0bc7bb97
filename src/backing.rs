//! On-disk backing store for evicted pages.
//!
//! Line-oriented text format: `<process>_page_<n>` followed by the page's
//! 16-bit words, space-separated. Saves append; on load the most recent
//! line for a key wins. An in-memory index mirrors the file so reloads do
//! not rescan it, but the file remains the durable format.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use tracing::warn;

pub struct BackingStore {
    path: PathBuf,
    index: HashMap<String, Vec<u16>>,
}

impl BackingStore {
    /// Open a backing store, replaying any existing file into the index.
    pub fn open(path: PathBuf) -> Self {
        let mut index = HashMap::new();
        if let Ok(text) = fs::read_to_string(&path) {
            for line in text.lines() {
                let mut fields = line.split_whitespace();
                let Some(key) = fields.next() else { continue };
                let words: Vec<u16> = fields.map(|w| w.parse().unwrap_or(0)).collect();
                // Later lines overwrite earlier ones: last write wins.
                index.insert(key.to_string(), words);
            }
        }
        BackingStore { path, index }
    }

    pub fn page_key(process: &str, page: usize) -> String {
        format!("{process}_page_{page}")
    }

    /// Persist a page. Appends one line; the index is updated in place.
    pub fn save(&mut self, key: &str, words: &[u16]) {
        self.index.insert(key.to_string(), words.to_vec());

        let mut line = String::from(key);
        for word in words {
            line.push(' ');
            line.push_str(&word.to_string());
        }
        line.push('\n');

        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(line.as_bytes()));
        if let Err(err) = result {
            warn!(path = %self.path.display(), %err, "backing store append failed");
        }
    }

    /// Fetch a page, zero-filled when the key was never saved.
    pub fn load(&self, key: &str, len: usize) -> Vec<u16> {
        match self.index.get(key) {
            Some(words) => {
                let mut page = words.clone();
                page.resize(len, 0);
                page
            }
            None => vec![0; len],
        }
    }
}
