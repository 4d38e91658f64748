//! A byte-keyed prefix trie used to greedily match the longest registered
//! multi-character sigil (`==`, `<=`, `{{-`, `-%}`, …) starting at a given
//! source position. Adapted from a punctuation matcher of the same name
//! (used by a lexer's punctuation-scanning module), generalized here to
//! back the lexer's dynamic, registration-driven sigil alphabet
//! instead of a fixed compile-time punctuation list. The original's
//! `Option<TToken>` leaf payload collapses to a plain `terminal: bool`
//! here — the lexer only needs the matched *length*; the resolved
//! [`crate::node::NodeType`] for that symbol is looked up afterward in the
//! relevant `Context` table by the matched substring.
#[derive(Debug, Clone)]
pub struct FieldTree {
    terminal: bool,
    children: Vec<(u8, FieldTree)>,
}

impl FieldTree {
    pub fn new() -> Self {
        Self {
            terminal: false,
            children: Vec::new(),
        }
    }

    pub fn insert(&mut self, symbol: &str) {
        let bytes = symbol.as_bytes();
        if bytes.is_empty() {
            self.terminal = true;
            return;
        }
        match self.children.binary_search_by_key(&bytes[0], |c| c.0) {
            Ok(index) => self.children[index]
                .1
                .insert(std::str::from_utf8(&bytes[1..]).unwrap()),
            Err(index) => {
                let mut child = FieldTree::new();
                child.insert(std::str::from_utf8(&bytes[1..]).unwrap());
                self.children.insert(index, (bytes[0], child));
            }
        }
    }

    /// Return the length, in bytes, of the longest registered symbol that is
    /// a prefix of `input`. `0` means no registered symbol matches at all.
    pub fn longest_match(&self, input: &[u8]) -> usize {
        let mut node = self;
        let mut best = if node.terminal { 0 } else { usize::MAX };
        let mut index = 0;
        loop {
            if node.terminal {
                best = index;
            }
            if index >= input.len() {
                break;
            }
            match node.children.binary_search_by_key(&input[index], |c| c.0) {
                Ok(i) => {
                    node = &node.children[i].1;
                    index += 1;
                }
                Err(_) => break,
            }
        }
        if node.terminal {
            best = index;
        }
        if best == usize::MAX {
            0
        } else {
            best
        }
    }
}

impl Default for FieldTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longest_match_prefers_longer_symbol() {
        let mut tree = FieldTree::new();
        for s in ["=", "==", "<", "<=", "-", "-%}", "-}}"] {
            tree.insert(s);
        }
        assert_eq!(tree.longest_match(b"==="), 2);
        assert_eq!(tree.longest_match(b"<x"), 1);
        assert_eq!(tree.longest_match(b"-%}x"), 3);
        assert_eq!(tree.longest_match(b"-}}"), 3);
        assert_eq!(tree.longest_match(b"-x"), 1);
        assert_eq!(tree.longest_match(b"?"), 0);
    }
}
