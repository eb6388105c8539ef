use crate::{MAX_NAME_LEN, MIN_ELEMENT_LEN};
use derivative::*;
use log::debug;
use std::borrow::Cow;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
/// An enum representing all possible errors when editing a resource list
pub enum ResourceError {
    #[error("Element data must be at least 4 bytes, got {0}")]
    DataTooShort(usize),
    #[error("Element name \"{0}\" is longer than 32 bytes")]
    NameTooLong(String),
    #[error("Element name {0:?} contains a NUL byte")]
    NameHasNul(String),
    #[error("An element named \"{0}\" already exists")]
    DuplicateName(String),
    #[error("No element named \"{0}\"")]
    NotFound(String),
    #[error("Element index {0} out of range")]
    OutOfRange(usize),
    #[error(transparent)]
    IOError(#[from] std::io::Error),
}

pub type Result<T> = core::result::Result<T, ResourceError>;

/// Whether a slot holds data, a filler or nothing at all
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum ElementStatus {
    Invalid,
    Filler,
    Valid,
}

#[derive(Derivative, Clone, PartialEq, Eq, Default)]
#[derivative(Debug)]
/// A named binary blob, or an empty filler slot
pub struct Element {
    name: String,
    #[derivative(Debug(format_with = "fmt_len"))]
    data: Vec<u8>,
}

fn fmt_len(data: &Vec<u8>, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    write!(f, "[{} bytes]", data.len())
}

impl Element {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_filler(&self) -> bool {
        self.data.is_empty()
    }

    /// The embedded type tag, i.e. the first four bytes of the data
    pub fn signature(&self) -> Option<[u8; 4]> {
        if self.data.len() < MIN_ELEMENT_LEN {
            return None;
        }
        let mut sig = [0u8; 4];
        sig.copy_from_slice(&self.data[..4]);
        Some(sig)
    }

    /// Consumes the element, returning its buffer
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

fn check_name(name: &str) -> Result<()> {
    if name.len() > MAX_NAME_LEN {
        return Err(ResourceError::NameTooLong(name.to_owned()));
    }
    if name.contains('\0') {
        return Err(ResourceError::NameHasNul(name.to_owned()));
    }
    Ok(())
}

/// Ordered list of elements for one category. The position of an element is
/// its resource ID, so readers keep deleted slots as fillers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourceList {
    elements: Vec<Element>,
}

impl ResourceList {
    pub fn new() -> ResourceList {
        ResourceList::default()
    }

    /// Drops every element
    pub fn clear(&mut self) {
        self.elements.clear();
    }

    pub fn count(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Appends a new element. Borrowed data is copied, owned data is moved in
    /// without a copy. Non-empty names must be unique within the list.
    pub fn add<'a, T>(&mut self, name: &str, data: T) -> Result<usize>
    where
        T: Into<Cow<'a, [u8]>>,
    {
        if self.find_by_name(name).is_some() {
            return Err(ResourceError::DuplicateName(name.to_owned()));
        }
        let element = Self::make_element(name, data)?;
        self.elements.push(element);
        Ok(self.elements.len() - 1)
    }

    /// Appends an element read from an image. Names are not checked for
    /// uniqueness so every on-disk slot keeps its ID.
    pub(crate) fn push_element(&mut self, name: &str, data: &[u8]) -> usize {
        self.elements.push(Element {
            name: name.to_owned(),
            data: data.to_vec(),
        });
        self.elements.len() - 1
    }

    /// Appends an empty slot so that later elements keep their index
    pub fn add_filler(&mut self) -> usize {
        self.elements.push(Element::default());
        self.elements.len() - 1
    }

    /// Replaces the data of the element called `name`
    pub fn update<'a, T>(&mut self, name: &str, data: T) -> Result<usize>
    where
        T: Into<Cow<'a, [u8]>>,
    {
        let index = self
            .find_by_name(name)
            .ok_or_else(|| ResourceError::NotFound(name.to_owned()))?;
        self.update_at(index, name, data)
    }

    /// Replaces the element at `index`, renaming it to `name`
    pub fn update_at<'a, T>(&mut self, index: usize, name: &str, data: T) -> Result<usize>
    where
        T: Into<Cow<'a, [u8]>>,
    {
        if index >= self.elements.len() {
            return Err(ResourceError::OutOfRange(index));
        }
        if let Some(existing) = self.find_by_name(name) {
            if existing != index {
                return Err(ResourceError::DuplicateName(name.to_owned()));
            }
        }
        self.elements[index] = Self::make_element(name, data)?;
        Ok(index)
    }

    fn make_element<'a, T>(name: &str, data: T) -> Result<Element>
    where
        T: Into<Cow<'a, [u8]>>,
    {
        check_name(name)?;
        let data = data.into();
        if data.len() < MIN_ELEMENT_LEN {
            return Err(ResourceError::DataTooShort(data.len()));
        }
        Ok(Element {
            name: name.to_owned(),
            data: data.into_owned(),
        })
    }

    /// Removes the element at `index`, shifting every later element down
    pub fn remove(&mut self, index: usize) -> bool {
        if index >= self.elements.len() {
            return false;
        }
        self.elements.remove(index);
        true
    }

    pub fn remove_by_name(&mut self, name: &str) -> bool {
        match self.find_by_name(name) {
            Some(index) => self.remove(index),
            None => false,
        }
    }

    pub fn get(&self, index: usize) -> Option<&Element> {
        self.elements.get(index)
    }

    pub fn status(&self, index: usize) -> ElementStatus {
        match self.elements.get(index) {
            None => ElementStatus::Invalid,
            Some(element) if element.is_filler() => ElementStatus::Filler,
            Some(_) => ElementStatus::Valid,
        }
    }

    /// Linear search by name. Empty names never match.
    pub fn find_by_name(&self, name: &str) -> Option<usize> {
        if name.is_empty() {
            return None;
        }
        self.elements.iter().position(|e| e.name == name)
    }

    /// Linear search for an element holding exactly `data`
    pub fn find_by_data(&self, data: &[u8]) -> Option<usize> {
        if data.len() < MIN_ELEMENT_LEN {
            return None;
        }
        self.elements.iter().position(|e| e.data == data)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Element> {
        self.elements.iter()
    }

    /// Writes the element at `index` to `dir/<name>.<ext>`, or
    /// `dir/zzz<index>.<ext>` when it has no name. Returns false for fillers.
    pub fn extract_element<P: AsRef<Path>>(&self, index: usize, dir: P, ext: &str) -> Result<bool> {
        let element = self
            .elements
            .get(index)
            .ok_or(ResourceError::OutOfRange(index))?;
        if element.is_filler() {
            return Ok(false);
        }
        let file_name = if element.name.is_empty() {
            format!("zzz{}.{}", index, ext)
        } else {
            format!("{}.{}", element.name, ext)
        };
        let path = dir.as_ref().join(file_name);
        debug!("Writing {} bytes to {}", element.data.len(), path.display());
        std::fs::write(path, &element.data)?;
        Ok(true)
    }

    /// Writes every non-filler element to `dir`. Returns true when every
    /// slot was written.
    pub fn extract_to<P: AsRef<Path>>(&self, dir: P, ext: &str) -> Result<bool> {
        let mut all = true;
        for index in 0..self.elements.len() {
            all &= self.extract_element(index, dir.as_ref(), ext)?;
        }
        Ok(all)
    }
}

impl<'a> IntoIterator for &'a ResourceList {
    type Item = &'a Element;
    type IntoIter = std::slice::Iter<'a, Element>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}
