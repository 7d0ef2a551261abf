/*!
CSV import and export of register maps.

Field CSV columns, in order:

```text
Section,RegisterNumber,Bits,Property,Description,ValueMeaning,Value
```

`RegisterNumber` is hex (`0x` prefix) or decimal; a blank register number
continues the previous row's register. Rows whose `Property` is blank,
`invalid` or `reserved` document unused bits and are skipped.

The register-only format has two columns, `Register,Value`, with one row per
register address and the fields folded into one value.
*/

use crate::error::{Result, SharedError};
use crate::field::{BitRange, RegisterField};
use crate::register_map::{RegisterImage, RegisterMap};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::{debug, info};

/// Header of the field CSV format
pub const FIELD_HEADERS: [&str; 7] = [
    "Section",
    "RegisterNumber",
    "Bits",
    "Property",
    "Description",
    "ValueMeaning",
    "Value",
];

/// Header of the register-only CSV format
pub const REGISTER_HEADERS: [&str; 2] = ["Register", "Value"];

#[derive(Debug, Serialize)]
struct FieldRow<'a> {
    #[serde(rename = "Section")]
    section: &'a str,
    #[serde(rename = "RegisterNumber")]
    register_number: String,
    #[serde(rename = "Bits")]
    bits: String,
    #[serde(rename = "Property")]
    property: &'a str,
    #[serde(rename = "Description")]
    description: &'a str,
    #[serde(rename = "ValueMeaning")]
    value_meaning: &'a str,
    #[serde(rename = "Value")]
    value: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct RegisterRow {
    #[serde(rename = "Register")]
    register: String,
    #[serde(rename = "Value")]
    value: String,
}

/// Property names that mark a schema comment rather than a field
fn is_schema_comment(property: &str) -> bool {
    property.is_empty()
        || property.eq_ignore_ascii_case("invalid")
        || property.eq_ignore_ascii_case("reserved")
}

/// Parse `0x`-prefixed hex, decimal, or integral float text such as `"12.0"`
pub fn parse_number(text: &str) -> Result<u32> {
    let text = text.trim();
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return u32::from_str_radix(hex, 16)
            .map_err(|_| SharedError::invalid_file_format(format!("Invalid hex number: '{}'", text)));
    }
    if let Ok(value) = text.parse::<u32>() {
        return Ok(value);
    }
    text.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .and_then(|v| num_traits::ToPrimitive::to_u32(&v.trunc()))
        .ok_or_else(|| SharedError::invalid_file_format(format!("Invalid number: '{}'", text)))
}

fn parse_address(text: &str) -> Result<u16> {
    let value = parse_number(text)?;
    u16::try_from(value)
        .map_err(|_| SharedError::invalid_file_format(format!("Register address out of range: '{}'", text)))
}

/// Build a register map from field CSV text
pub fn read_fields<R: Read>(reader: R) -> Result<RegisterMap> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut map = RegisterMap::new();
    let mut address: Option<u16> = None;

    for (row, record) in rdr.records().enumerate() {
        let record = record?;
        let line = row + 2;
        let column = |i: usize| record.get(i).unwrap_or("");

        if !column(1).is_empty() {
            address = Some(parse_address(column(1)).map_err(|e| at_line(line, e))?);
        }

        let property = column(3);
        if is_schema_comment(property) {
            continue;
        }

        let address = address.ok_or_else(|| {
            SharedError::invalid_file_format(format!("line {}: '{}' has no register number", line, property))
        })?;
        let bits = BitRange::parse(column(2)).map_err(|e| at_line(line, e))?;
        let value = parse_number(column(6)).map_err(|e| at_line(line, e))?;

        let field = RegisterField::new(property, address, bits, value)?
            .with_text(column(0), column(4), column(5));
        if map.insert(field).is_some() {
            debug!("line {}: '{}' redefined, keeping the later row", line, property);
        }
    }

    Ok(map)
}

fn at_line(line: usize, err: SharedError) -> SharedError {
    match err {
        SharedError::InvalidFileFormat(msg) => {
            SharedError::invalid_file_format(format!("line {}: {}", line, msg))
        }
        other => other,
    }
}

/// Write one CSV row per field, in schema order
pub fn write_fields<W: Write>(map: &RegisterMap, writer: W) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
    wtr.write_record(FIELD_HEADERS)?;
    for field in map {
        wtr.serialize(FieldRow {
            section: &field.section,
            register_number: format!("0x{:04X}", field.register_address),
            bits: field.bits.to_string(),
            property: &field.name,
            description: &field.description,
            value_meaning: &field.value_meaning,
            value: field.value(),
        })?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write one CSV row per register address, values as hex
pub fn write_registers<W: Write>(map: &RegisterMap, writer: W) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
    wtr.write_record(REGISTER_HEADERS)?;
    for (address, value) in map.to_registers() {
        wtr.serialize(RegisterRow {
            register: format!("0x{:04X}", address),
            value: format!("0x{:02X}", value),
        })?;
    }
    wtr.flush()?;
    Ok(())
}

/// Read a register-only CSV into a register image
pub fn read_registers<R: Read>(reader: R) -> Result<RegisterImage> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut image = RegisterImage::new();
    for (row, record) in rdr.deserialize::<RegisterRow>().enumerate() {
        let record = record?;
        let line = row + 2;
        let address = parse_address(&record.register).map_err(|e| at_line(line, e))?;
        let value = parse_number(&record.value).map_err(|e| at_line(line, e))?;
        image.insert(address, value);
    }
    Ok(image)
}

/// Import a field CSV file
pub fn import_csv<P: AsRef<Path>>(path: P) -> Result<RegisterMap> {
    let path = path.as_ref();
    let map = read_fields(File::open(path)?)?;
    info!("Imported {} fields from {}", map.len(), path.display());
    Ok(map)
}

/// Export a map as a field CSV file
pub fn export_csv<P: AsRef<Path>>(path: P, map: &RegisterMap) -> Result<()> {
    let path = path.as_ref();
    write_fields(map, File::create(path)?)?;
    info!("Exported {} fields to {}", map.len(), path.display());
    Ok(())
}

/// Export a map as a register-only CSV file
pub fn export_registers<P: AsRef<Path>>(path: P, map: &RegisterMap) -> Result<()> {
    let path = path.as_ref();
    write_registers(map, File::create(path)?)?;
    info!("Exported register image to {}", path.display());
    Ok(())
}

/// Import a register-only CSV file
pub fn import_registers<P: AsRef<Path>>(path: P) -> Result<RegisterImage> {
    let path = path.as_ref();
    let image = read_registers(File::open(path)?)?;
    info!("Imported {} registers from {}", image.len(), path.display());
    Ok(image)
}
