/*!
Object dictionary entries pushed to a drive through SDO downloads.

The dictionary is an ordered list, produced by some configuration loader outside this crate. Order matters: entries are downloaded exactly in the order they are listed, since a drive may refuse some values until others are set (for instance a mapping count before the mapped items).

# Example

```
use coeaxis::{ObjectDictionary, DictionaryEntry, SdoValue};

let mut dictionary = ObjectDictionary::from(vec![
    DictionaryEntry::new(0x6060, 0, SdoValue::Int32(8)),
    DictionaryEntry::new(0x607a, 0, SdoValue::Int32(1000)),
    ]);
// override a value before it is sent
dictionary.set_entry(0x607a, 0, SdoValue::Int32(0));
assert_eq!(dictionary.get(0x607a, 0).map(|entry| entry.value), Some(SdoValue::Int32(0)));
```
*/

use core::fmt;
use std::{
    collections::HashMap,
    net::IpAddr,
    };


/// value of a dictionary entry, every value fits the 4 bytes of an expedited transfer
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum SdoValue {
    Int32(i32),
    Float32(f32),
}
impl SdoValue {
    /// little endian bytes as sent on the wire
    pub fn to_le_bytes(self) -> [u8; 4] {
        match self {
            Self::Int32(value) => value.to_le_bytes(),
            Self::Float32(value) => value.to_le_bytes(),
        }
    }
    /// read bytes received from the wire with the same type as `self`
    pub fn same_type(self, bytes: [u8; 4]) -> Self {
        match self {
            Self::Int32(_) => Self::Int32(i32::from_le_bytes(bytes)),
            Self::Float32(_) => Self::Float32(f32::from_le_bytes(bytes)),
        }
    }
}
impl From<i32> for SdoValue {
    fn from(value: i32) -> Self {Self::Int32(value)}
}
impl From<f32> for SdoValue {
    fn from(value: f32) -> Self {Self::Float32(value)}
}
impl fmt::Display for SdoValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Int32(value) => write!(f, "{}", value),
            Self::Float32(value) => write!(f, "{:?}", value),
        }
    }
}

/// one addressable value of the dictionary
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DictionaryEntry {
	/// index of the item in the slave's dictionnary of objects
    pub index: u16,
	/// subindex in the item
    pub sub: u8,
    pub value: SdoValue,
}
impl DictionaryEntry {
    pub fn new(index: u16, sub: u8, value: SdoValue) -> Self {
        Self {index, sub, value}
    }
}
impl fmt::Display for DictionaryEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#06x}:{:02x} = {}", self.index, self.sub, self.value)
    }
}

/// ordered list of dictionary entries destinated to one drive
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjectDictionary {
    entries: Vec<DictionaryEntry>,
}
impl ObjectDictionary {
    pub fn new() -> Self {Self::default()}

    /// append an entry, it will be downloaded after all the previous ones
    pub fn push(&mut self, entry: DictionaryEntry) {
        self.entries.push(entry);
    }
    pub fn entries(&self) -> &[DictionaryEntry] {&self.entries}
    pub fn len(&self) -> usize {self.entries.len()}
    pub fn is_empty(&self) -> bool {self.entries.is_empty()}

    /// the first entry with the given address
    pub fn get(&self, index: u16, sub: u8) -> Option<&DictionaryEntry> {
        self.entries.iter().find(|entry| entry.index == index && entry.sub == sub)
    }

    /**
        replace the value of the entries with the given address

        Nothing happens when no entry matches: overriding a value the drive is not configured with is harmless, so callers needing a guarantee must check with [Self::get] beforehand.
    */
    pub fn set_entry(&mut self, index: u16, sub: u8, value: SdoValue) {
        for entry in self.entries.iter_mut()
                        .filter(|entry| entry.index == index && entry.sub == sub) {
            entry.value = value;
        }
    }
}
impl From<Vec<DictionaryEntry>> for ObjectDictionary {
    fn from(entries: Vec<DictionaryEntry>) -> Self {Self {entries}}
}
impl FromIterator<DictionaryEntry> for ObjectDictionary {
    fn from_iter<I: IntoIterator<Item=DictionaryEntry>>(iter: I) -> Self {
        Self {entries: iter.into_iter().collect()}
    }
}
impl<'a> IntoIterator for &'a ObjectDictionary {
    type Item = &'a DictionaryEntry;
    type IntoIter = core::slice::Iter<'a, DictionaryEntry>;
    fn into_iter(self) -> Self::IntoIter {self.entries.iter()}
}


/**
    source of the dictionary to push to each drive

    This is the seam with whatever loads configuration files, this crate never parses them itself.
*/
pub trait DictionaryProvider: Send + Sync {
    /// dictionary for the drive at the given address, `None` if that drive is not configured
    fn dictionary(&self, address: IpAddr) -> Option<ObjectDictionary>;
}

/// the same dictionary for every drive
impl DictionaryProvider for ObjectDictionary {
    fn dictionary(&self, _address: IpAddr) -> Option<ObjectDictionary> {
        Some(self.clone())
    }
}

impl DictionaryProvider for HashMap<IpAddr, ObjectDictionary> {
    fn dictionary(&self, address: IpAddr) -> Option<ObjectDictionary> {
        self.get(&address).cloned()
    }
}
