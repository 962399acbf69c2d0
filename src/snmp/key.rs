//! Parser for `name[param,...]` item keys.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemKey {
    pub name: String,
    pub params: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("missing closing bracket")]
    Unclosed,
    #[error("unterminated quoted parameter")]
    UnterminatedQuote,
    #[error("unexpected character after quoted parameter")]
    AfterQuote,
    #[error("unexpected characters after closing bracket")]
    Trailing,
}

impl ItemKey {
    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }
}

/// Split a key into its name and parameters.
///
/// Parameters are either quoted (`"a,b"`, with `\"` for a literal quote)
/// or run up to the next `,` or `]`. `name[]` has one empty parameter,
/// `name` has none.
pub fn parse_key(key: &str) -> Result<ItemKey, KeyError> {
    let Some(open) = key.find('[') else {
        return Ok(ItemKey {
            name: key.to_string(),
            params: Vec::new(),
        });
    };

    let name = key[..open].to_string();
    let body: Vec<char> = key[open + 1..].chars().collect();
    let mut params = Vec::new();
    let mut pos = 0;

    loop {
        while body.get(pos) == Some(&' ') {
            pos += 1;
        }

        let mut param = String::new();
        if body.get(pos) == Some(&'"') {
            pos += 1;
            loop {
                match body.get(pos) {
                    None => return Err(KeyError::UnterminatedQuote),
                    Some('\\') if body.get(pos + 1) == Some(&'"') => {
                        param.push('"');
                        pos += 2;
                    }
                    Some('"') => {
                        pos += 1;
                        break;
                    }
                    Some(&c) => {
                        param.push(c);
                        pos += 1;
                    }
                }
            }
            while body.get(pos) == Some(&' ') {
                pos += 1;
            }
            if !matches!(body.get(pos), Some(',') | Some(']')) {
                return Err(if pos >= body.len() {
                    KeyError::Unclosed
                } else {
                    KeyError::AfterQuote
                });
            }
        } else {
            while let Some(&c) = body.get(pos) {
                if c == ',' || c == ']' {
                    break;
                }
                param.push(c);
                pos += 1;
            }
        }

        params.push(param);

        match body.get(pos) {
            Some(',') => pos += 1,
            Some(']') => {
                if pos + 1 != body.len() {
                    return Err(KeyError::Trailing);
                }
                break;
            }
            _ => return Err(KeyError::Unclosed),
        }
    }

    Ok(ItemKey { name, params })
}
