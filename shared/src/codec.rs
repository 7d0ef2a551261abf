/*!
Composite register values.

Wide logical values (HMAX, FMOD, integration ticks, RANDNM...) are spread
over consecutive 8-bit fields, least significant byte first:

```text
value = field[0] | field[1] << 8 | field[2] << 16 | field[3] << 24
```

Packing truncates the value to the composite width and each byte to the
width of the field that receives it. The only failure is a field name that
is not in the map, which is detected before anything is written.
*/

use crate::error::Result;
use crate::register_map::RegisterMap;

/// Write `value` across `fields`, low byte first
pub fn pack(map: &mut RegisterMap, value: u32, fields: &[&str]) -> Result<()> {
    for name in fields {
        map.field(name)?;
    }

    let value = match fields.len() * 8 {
        bits if bits >= 32 => value,
        bits => value & ((1u32 << bits) - 1),
    };

    for (i, name) in fields.iter().enumerate() {
        map.set_masked(name, (value >> (8 * i)) & 0xFF)?;
    }
    Ok(())
}

/// Read the composite value stored across `fields`, low byte first
pub fn unpack(map: &RegisterMap, fields: &[&str]) -> Result<u32> {
    fields.iter().enumerate().try_fold(0u32, |acc, (i, name)| {
        let byte = map.get(name)? & 0xFF;
        Ok(acc | (byte << (8 * i)))
    })
}

pub fn pack_16(map: &mut RegisterMap, value: u32, fields: [&str; 2]) -> Result<()> {
    pack(map, value, &fields)
}

pub fn pack_24(map: &mut RegisterMap, value: u32, fields: [&str; 3]) -> Result<()> {
    pack(map, value, &fields)
}

pub fn pack_32(map: &mut RegisterMap, value: u32, fields: [&str; 4]) -> Result<()> {
    pack(map, value, &fields)
}

pub fn unpack_16(map: &RegisterMap, fields: [&str; 2]) -> Result<u32> {
    unpack(map, &fields)
}

pub fn unpack_24(map: &RegisterMap, fields: [&str; 3]) -> Result<u32> {
    unpack(map, &fields)
}

pub fn unpack_32(map: &RegisterMap, fields: [&str; 4]) -> Result<u32> {
    unpack(map, &fields)
}
