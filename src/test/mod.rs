//! Shared fixtures for unit tests.
//!
//! - [`MockModule`] - an in-memory [`Module`] recording what the binder writes
//! - [`PlainMemory`] - a [`CodeMemory`] over an ordinary heap buffer

use std::{
    collections::HashMap,
    sync::Mutex,
};

use crate::{
    hook::CodeMemory,
    module::{ImportReference, Module},
    Result,
};

/// A module whose references and symbols are declared up front.
#[derive(Debug, Default)]
pub struct MockModule {
    name: String,
    base: usize,
    references: Vec<ImportReference>,
    symbols: HashMap<String, usize>,
    bound: HashMap<String, usize>,
    writes: usize,
}

impl MockModule {
    pub fn new(name: &str, base: usize) -> Self {
        Self {
            name: name.to_string(),
            base,
            ..Self::default()
        }
    }

    pub fn with_function(mut self, name: &str) -> Self {
        let index = self.references.len();
        self.references.push(ImportReference::function(name, index));
        self
    }

    pub fn with_data(mut self, name: &str) -> Self {
        let index = self.references.len();
        self.references.push(ImportReference::data(name, index));
        self
    }

    pub fn with_symbol(mut self, name: &str, address: usize) -> Self {
        self.symbols.insert(name.to_string(), address);
        self
    }

    /// Target written for `name`, if the binder wrote one.
    pub fn bound_target(&self, name: &str) -> Option<usize> {
        self.bound.get(name).copied()
    }

    /// Number of reference writes.
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl Module for MockModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn base_address(&self) -> usize {
        self.base
    }

    fn references(&self) -> Vec<ImportReference> {
        self.references.clone()
    }

    unsafe fn bind(&mut self, reference: &ImportReference, target: usize) -> Result<()> {
        self.writes += 1;
        self.bound.entry(reference.name.clone()).or_insert(target);
        Ok(())
    }

    fn find_symbol(&self, name: &str) -> Option<usize> {
        self.symbols.get(name).copied()
    }
}

/// Writable, non-executable stand-in for module text.
#[derive(Debug)]
pub struct PlainMemory {
    words: Mutex<Box<[u64]>>,
    base: usize,
    len: usize,
}

impl PlainMemory {
    /// `len` bytes of `fill`, 8-byte aligned.
    pub fn filled(len: usize, fill: u8) -> Self {
        let word = u64::from_ne_bytes([fill; 8]);
        let words = vec![word; len.div_ceil(8)].into_boxed_slice();
        let base = words.as_ptr() as usize;
        Self {
            words: Mutex::new(words),
            base,
            len,
        }
    }

    pub fn base(&self) -> usize {
        self.base
    }

    /// Copy of `len` bytes at `offset`.
    pub fn bytes(&self, offset: usize, len: usize) -> Vec<u8> {
        let _words = self.words.lock().unwrap();
        // SAFETY: bounds are the caller's responsibility in tests, the lock pins the buffer
        unsafe { std::slice::from_raw_parts((self.base + offset) as *const u8, len).to_vec() }
    }

    fn check(&self, address: usize, len: usize) -> Result<()> {
        if address < self.base || address + len > self.base + self.len {
            return Err(malformed_error!(
                "access {:#x}+{} outside plain memory",
                address,
                len
            ));
        }
        Ok(())
    }
}

impl CodeMemory for PlainMemory {
    unsafe fn read(&self, address: usize, len: usize) -> Result<Vec<u8>> {
        self.check(address, len)?;
        let _words = self.words.lock().unwrap();
        Ok(std::slice::from_raw_parts(address as *const u8, len).to_vec())
    }

    unsafe fn write(&self, address: usize, bytes: &[u8]) -> Result<()> {
        self.check(address, bytes.len())?;
        let _words = self.words.lock().unwrap();
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), address as *mut u8, bytes.len());
        Ok(())
    }
}
