/*!
Built-in default register maps.

The schemas ship inside the crate as field CSVs so a map can be created
without any file on disk. Each default is a consistent power-on
configuration for its sensor.
*/

use crate::calculator::SensorKind;
use crate::csv_io;
use crate::error::Result;
use crate::register_map::RegisterMap;

const EPC660_CSV: &str = include_str!("../data/epc660.csv");
const MLX75027_CSV: &str = include_str!("../data/mlx75027.csv");
const MLX75026_CSV: &str = include_str!("../data/mlx75026.csv");

/// Field CSV text of a built-in schema
pub fn schema_csv(kind: SensorKind) -> &'static str {
    match kind {
        SensorKind::Epc660 => EPC660_CSV,
        SensorKind::Mlx75027 => MLX75027_CSV,
        SensorKind::Mlx75026 => MLX75026_CSV,
    }
}

/// Default map for a sensor family
pub fn for_kind(kind: SensorKind) -> Result<RegisterMap> {
    csv_io::read_fields(schema_csv(kind).as_bytes())
}

pub fn epc660() -> Result<RegisterMap> {
    for_kind(SensorKind::Epc660)
}

pub fn mlx75027() -> Result<RegisterMap> {
    for_kind(SensorKind::Mlx75027)
}

pub fn mlx75026() -> Result<RegisterMap> {
    for_kind(SensorKind::Mlx75026)
}
