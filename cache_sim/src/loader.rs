use thiserror::Error;

use crate::common::Word;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("error in reading address {addr}: {text:?} is not a word")]
    BadWord { addr: usize, text: String },
    #[error("program of {words} words does not fit in {capacity} words of memory")]
    TooLarge { words: usize, capacity: usize },
}

/// parses a machine-code image: one decimal word per line.
pub fn parse_image(src: &str, capacity: usize) -> Result<Vec<Word>, LoadError> {
    let mut image = Vec::new();
    for (addr, line) in src.lines().enumerate() {
        let text = line.trim();
        let word = text.parse::<Word>().map_err(|_| LoadError::BadWord {
            addr,
            text: text.to_string(),
        })?;
        image.push(word);
    }
    if image.len() > capacity {
        return Err(LoadError::TooLarge {
            words: image.len(),
            capacity,
        });
    }
    Ok(image)
}
