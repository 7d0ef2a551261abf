/*!
The register map: an insertion-ordered set of named bit-fields.

This is the one piece of mutable state the calculators work on. It is owned
by a single caller and passed by reference into every calculator call.
*/

use crate::csv_io;
use crate::error::{Result, SharedError};
use crate::field::RegisterField;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::debug;

/// Register address to folded register value
pub type RegisterImage = BTreeMap<u16, u32>;

/// Named register fields in schema order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegisterMap {
    fields: Vec<RegisterField>,
    index: HashMap<String, usize>,
}

impl RegisterMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a map from a field CSV file
    pub fn from_csv_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        csv_io::import_csv(path)
    }

    /// Write the map to a field CSV file
    pub fn to_csv_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        csv_io::export_csv(path, self)
    }

    /// Add a field. A field with the same name is replaced in place and
    /// returned.
    pub fn insert(&mut self, field: RegisterField) -> Option<RegisterField> {
        match self.index.get(&field.name) {
            Some(&i) => Some(std::mem::replace(&mut self.fields[i], field)),
            None => {
                self.index.insert(field.name.clone(), self.fields.len());
                self.fields.push(field);
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Look up a field by name
    pub fn field(&self, name: &str) -> Result<&RegisterField> {
        self.index
            .get(name)
            .map(|&i| &self.fields[i])
            .ok_or_else(|| SharedError::unknown_field(name))
    }

    fn field_mut(&mut self, name: &str) -> Result<&mut RegisterField> {
        match self.index.get(name) {
            Some(&i) => Ok(&mut self.fields[i]),
            None => Err(SharedError::unknown_field(name)),
        }
    }

    /// Current value of a field
    pub fn get(&self, name: &str) -> Result<u32> {
        self.field(name).map(RegisterField::value)
    }

    /// Set a field value. Values wider than the field are a range error and
    /// leave the field unchanged.
    pub fn set(&mut self, name: &str, value: u32) -> Result<()> {
        self.field_mut(name)?.set_value(value)
    }

    /// Set a field value truncated to its width
    pub(crate) fn set_masked(&mut self, name: &str, value: u32) -> Result<()> {
        self.field_mut(name)?.set_masked(value);
        Ok(())
    }

    /// Read a boolean field
    pub fn flag(&self, name: &str) -> Result<bool> {
        Ok(self.get(name)? != 0)
    }

    /// Write a boolean field as 0/1
    pub fn set_flag(&mut self, name: &str, on: bool) -> Result<()> {
        self.set(name, u32::from(on))
    }

    /// Fields in schema order
    pub fn iter(&self) -> impl Iterator<Item = &RegisterField> {
        self.fields.iter()
    }

    /// Field names in schema order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Fold every field into its register: one value per address
    pub fn to_registers(&self) -> RegisterImage {
        let mut image = RegisterImage::new();
        for field in &self.fields {
            *image.entry(field.register_address).or_insert(0) |= field.register_bits();
        }
        image
    }

    /// Update every field whose register is present in `image`. Fields at
    /// other addresses keep their values. Returns the number of fields
    /// updated.
    pub fn apply_registers(&mut self, image: &RegisterImage) -> usize {
        let mut updated = 0;
        for field in &mut self.fields {
            if let Some(&register) = image.get(&field.register_address) {
                let value = field.extract(register);
                field.set_masked(value);
                updated += 1;
            }
        }
        debug!("Applied {} registers to {} fields", image.len(), updated);
        updated
    }

    /// Run `f` against a copy of the map and keep the copy only if `f`
    /// succeeds
    pub fn transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut RegisterMap) -> Result<T>,
    {
        let mut staged = self.clone();
        let out = f(&mut staged)?;
        *self = staged;
        Ok(out)
    }
}

impl<'a> IntoIterator for &'a RegisterMap {
    type Item = &'a RegisterField;
    type IntoIter = std::slice::Iter<'a, RegisterField>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::BitRange;

    fn sequencer_map() -> RegisterMap {
        let mut map = RegisterMap::new();
        let fields = [
            ("num_dcs", 0x89, 0, 2, 3),
            ("mod_sel", 0x89, 2, 2, 0),
            ("pixel_mode", 0x89, 4, 1, 0),
            ("dual_int_mode", 0x89, 5, 1, 0),
            ("mod_clk_div", 0x85, 0, 8, 1),
        ];
        for (name, addr, offset, width, value) in fields {
            let bits = BitRange::new(offset, width).unwrap();
            map.insert(RegisterField::new(name, addr, bits, value).unwrap());
        }
        map
    }

    #[test]
    fn test_get_set() {
        let mut map = sequencer_map();
        assert_eq!(map.len(), 5);
        assert_eq!(map.get("num_dcs").unwrap(), 3);

        map.set("mod_sel", 3).unwrap();
        assert_eq!(map.get("mod_sel").unwrap(), 3);

        assert!(map.set("mod_sel", 4).unwrap_err().is_range());
        assert_eq!(map.get("mod_sel").unwrap(), 3);

        assert!(matches!(map.get("nope"), Err(SharedError::UnknownField(_))));
        assert!(!map.contains("nope"));
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut map = sequencer_map();
        let bits = BitRange::new(0, 2).unwrap();
        let old = map.insert(RegisterField::new("num_dcs", 0x89, bits, 1).unwrap());
        assert_eq!(old.map(|f| f.value()), Some(3));
        assert_eq!(map.len(), 5);
        assert_eq!(map.names().next(), Some("num_dcs"));
        assert_eq!(map.get("num_dcs").unwrap(), 1);
    }

    #[test]
    fn test_register_image() {
        let mut map = sequencer_map();
        map.set("pixel_mode", 1).unwrap();
        map.set("dual_int_mode", 1).unwrap();

        let image = map.to_registers();
        assert_eq!(image.len(), 2);
        assert_eq!(image[&0x89], 0b0011_0011);
        assert_eq!(image[&0x85], 1);

        let mut other = sequencer_map();
        let mut partial = RegisterImage::new();
        partial.insert(0x89, image[&0x89]);
        assert_eq!(other.apply_registers(&partial), 4);
        assert_eq!(other.get("dual_int_mode").unwrap(), 1);
        assert_eq!(other.get("mod_clk_div").unwrap(), 1);
        assert_eq!(other.to_registers(), image);
    }

    #[test]
    fn test_transaction_rolls_back() {
        let mut map = sequencer_map();
        let before = map.clone();
        let result = map.transaction(|m| {
            m.set("mod_sel", 3)?;
            m.set("num_dcs", 9)
        });
        assert!(result.is_err());
        assert_eq!(map, before);

        map.transaction(|m| m.set("mod_sel", 3)).unwrap();
        assert_eq!(map.get("mod_sel").unwrap(), 3);
    }
}
