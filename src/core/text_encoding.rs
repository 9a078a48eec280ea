// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Text encoding support for string directives.

use std::collections::HashMap;

use crate::core::assembler::error::{AsmError, AsmErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextEncodingId {
    Ascii,
    Latin1,
    Utf8,
    Utf16Le,
}

impl TextEncodingId {
    pub fn canonical_name(self) -> &'static str {
        match self {
            TextEncodingId::Ascii => "ascii",
            TextEncodingId::Latin1 => "latin1",
            TextEncodingId::Utf8 => "utf8",
            TextEncodingId::Utf16Le => "utf16le",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextEncodingError {
    UnknownEncoding(String),
    UnmappableChar { encoding: TextEncodingId, ch: char },
}

impl std::fmt::Display for TextEncodingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TextEncodingError::UnknownEncoding(name) => write!(f, "Unknown encoding: {name}"),
            TextEncodingError::UnmappableChar { encoding, ch } => write!(
                f,
                "Character U+{:04X} is not representable in {}",
                *ch as u32,
                encoding.canonical_name()
            ),
        }
    }
}

impl std::error::Error for TextEncodingError {}

impl From<TextEncodingError> for AsmError {
    fn from(err: TextEncodingError) -> Self {
        let kind = match err {
            TextEncodingError::UnknownEncoding(_) => AsmErrorKind::UnknownEncoding,
            TextEncodingError::UnmappableChar { .. } => AsmErrorKind::ValueOverflow,
        };
        AsmError::new(kind, &err.to_string(), None)
    }
}

pub struct TextEncodingRegistry {
    names: HashMap<String, TextEncodingId>,
}

impl Default for TextEncodingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TextEncodingRegistry {
    pub fn new() -> Self {
        let mut names = HashMap::new();
        for (alias, id) in [
            ("ascii", TextEncodingId::Ascii),
            ("us-ascii", TextEncodingId::Ascii),
            ("latin1", TextEncodingId::Latin1),
            ("latin-1", TextEncodingId::Latin1),
            ("iso-8859-1", TextEncodingId::Latin1),
            ("utf8", TextEncodingId::Utf8),
            ("utf-8", TextEncodingId::Utf8),
            ("utf16le", TextEncodingId::Utf16Le),
            ("utf-16le", TextEncodingId::Utf16Le),
            ("utf-16-le", TextEncodingId::Utf16Le),
            ("utf_16_le", TextEncodingId::Utf16Le),
        ] {
            names.insert(alias.to_string(), id);
        }
        Self { names }
    }

    pub fn default_encoding(&self) -> TextEncodingId {
        TextEncodingId::Ascii
    }

    pub fn known_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self
            .names
            .values()
            .map(|encoding| encoding.canonical_name())
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    pub fn resolve_name(&self, name: &str) -> Option<TextEncodingId> {
        self.names.get(&name.to_ascii_lowercase()).copied()
    }

    pub fn resolve_name_or_error(&self, name: &str) -> Result<TextEncodingId, TextEncodingError> {
        self.resolve_name(name)
            .ok_or_else(|| TextEncodingError::UnknownEncoding(name.to_string()))
    }

    pub fn encode_str(
        &self,
        encoding: TextEncodingId,
        text: &str,
    ) -> Result<Vec<u8>, TextEncodingError> {
        match encoding {
            TextEncodingId::Utf8 => Ok(text.as_bytes().to_vec()),
            TextEncodingId::Utf16Le => Ok(text
                .encode_utf16()
                .flat_map(|unit| unit.to_le_bytes())
                .collect()),
            TextEncodingId::Ascii => encode_single_byte(encoding, text, 0x7f),
            TextEncodingId::Latin1 => encode_single_byte(encoding, text, 0xff),
        }
    }
}

fn encode_single_byte(
    encoding: TextEncodingId,
    text: &str,
    max: u32,
) -> Result<Vec<u8>, TextEncodingError> {
    text.chars()
        .map(|ch| {
            if ch as u32 <= max {
                Ok(ch as u32 as u8)
            } else {
                Err(TextEncodingError::UnmappableChar { encoding, ch })
            }
        })
        .collect()
}
