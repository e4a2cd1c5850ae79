//! Mixed-script text analyzer.
//!
//! Text is split into runs of a single [`CharClass`]. Symbol runs only
//! separate tokens, every other class change starts a new token, so
//! `foo123` yields `foo` and `123` and never matches a document that only
//! contains `123` as part of a longer run of the same class.
//!
//! The same segmentation drives three consumers: document indexing
//! ([`index_terms`]), query decomposition and keyword normalization
//! ([`normalize_keyword`]).

/// Longest term (in bytes) that is written to the postings table.
pub const MAX_TERM_LEN: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharClass {
    Cjk,
    Latin,
    Digit,
    Symbol,
}

#[inline]
pub fn is_cjk(c: char) -> bool {
    matches!(c, '\u{4e00}'..='\u{9fa5}' | '\u{3400}'..='\u{4dbf}')
}

#[inline]
pub fn classify(c: char) -> CharClass {
    if is_cjk(c) {
        CharClass::Cjk
    } else if c.is_ascii_digit() {
        CharClass::Digit
    } else if c.is_ascii_alphabetic() {
        CharClass::Latin
    } else {
        CharClass::Symbol
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub class: CharClass,
}

/// Iterator over the raw non-symbol runs of `text`, borrowed from the input.
pub struct Segments<'a> {
    text: &'a str,
    offset: usize,
}

impl<'a> Iterator for Segments<'a> {
    type Item = (CharClass, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.text[self.offset..];
        let mut chars = rest.char_indices();

        let (start, class) = loop {
            let (idx, c) = chars.next()?;
            let class = classify(c);
            if class != CharClass::Symbol {
                break (idx, class);
            }
        };

        let end = chars
            .find(|&(_, c)| classify(c) != class)
            .map_or(rest.len(), |(idx, _)| idx);

        self.offset += end;
        Some((class, &rest[start..end]))
    }
}

pub fn segments(text: &str) -> Segments<'_> {
    Segments { text, offset: 0 }
}

/// Tokens of `text` in order. Letters are lowercased so stored and query
/// tokens compare equal regardless of case.
pub fn tokenize(text: &str) -> Vec<Token> {
    segments(text)
        .map(|(class, run)| Token {
            text: match class {
                CharClass::Latin => run.to_ascii_lowercase(),
                _ => run.to_string(),
            },
            class,
        })
        .collect()
}

/// Normalizes a user keyword: symbol runs become a single space, class
/// boundaries get a space, the result is trimmed. Case is preserved.
pub fn normalize_keyword(keyword: &str) -> String {
    let mut normalized = String::with_capacity(keyword.len() + 8);
    for (_, run) in segments(keyword) {
        if !normalized.is_empty() {
            normalized.push(' ');
        }
        normalized.push_str(run);
    }

    normalized
}

/// Posting terms with their positions inside the document.
///
/// Latin and digit tokens occupy one position each. CJK runs are expanded to
/// one term per ideograph at consecutive positions, which lets a CJK query
/// run match any contiguous part of an indexed run.
pub fn index_terms(text: &str) -> Vec<(String, u32)> {
    let mut terms = Vec::new();
    let mut position = 0u32;

    for token in tokenize(text) {
        match token.class {
            CharClass::Cjk => {
                for c in token.text.chars() {
                    terms.push((c.to_string(), position));
                    position = position.saturating_add(1);
                }
            }
            _ => {
                if token.text.len() <= MAX_TERM_LEN {
                    terms.push((token.text, position));
                }
                position = position.saturating_add(1);
            }
        }
    }

    terms
}
