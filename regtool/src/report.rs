/*!
Human-readable summaries of the quantities a register map encodes.
*/

use anyhow::Result;
use shared::{AngleUnit, Epc660, Mlx7502x, MlxVariant, RegisterMap, SensorCalculator, Warnings};

pub fn print_epc660(calc: &Epc660, map: &RegisterMap) -> Result<()> {
    println!("📷 EPC660 (MCLK {} MHz)", calc.clocks().mclk_mhz);
    println!("   Modulation:        {:.3} MHz{}", calc.mod_freq_mhz(map)?, if calc.external_mod(map)? { " (external)" } else { "" });
    println!("   Operating mode:    {:?}{}", calc.operating_mode(map)?, if calc.hdr(map)? { ", HDR" } else { "" });
    println!("   Integration (ms):  {:?}", calc.int_times_ms(map)?);
    println!("   Phase steps:       {:?}", calc.phase_steps(map)?);
    println!("   Light phase:       {:.2} deg", calc.light_phase(map, AngleUnit::Degrees)?);
    println!("   ROI:               {}", calc.roi(map)?);
    println!("   Mirrored ROI:      {}", calc.mirrored_roi(map)?);
    println!("   Binning:           {:?}", SensorCalculator::binning(calc, map)?);
    println!("   Image size:        {}", calc.image_size(map)?);
    Ok(())
}

pub fn print_mlx(calc: &Mlx7502x, map: &RegisterMap) -> Result<()> {
    calc.check(map)?;
    let nraw = calc.nraw(map)? as usize;
    let (depth_fps, raw_fps) = calc.fps(map)?;

    println!("📷 {}", calc.variant().kind());
    println!("   MIPI:              {} lanes, {} Mbps, output mode {}", calc.lanes(map)?, calc.speed(map)?, calc.output_mode(map)?);
    println!("   HMAX:              0x{:04X}", calc.hmax(map)?);
    println!("   Modulation:        {:.3} MHz, duty cycle {:.3}", calc.mod_freq_mhz(map)?, calc.duty_cycle(map)?);
    if calc.variant() == MlxVariant::Mlx75026 {
        println!("   Analog delay:      {:.6} us", calc.analog_delay_us(map)?);
    }
    println!("   Raw phases:        {}", nraw);
    println!("   Phase shifts:      {:?}", &calc.phase_shifts(map)?[..nraw]);
    println!("   Integration (us):  {:?}", &calc.int_times_us(map)?[..nraw]);
    println!("   Idle (us):         {:?}", &calc.idle_times_us(map)?[..nraw]);
    println!("   Pretime:           {:.3} us", calc.pretime_us(map)?);
    println!("   Phase times (us):  {:?}", &calc.phase_times_us(map)?[..nraw]);
    println!("   Frame time:        {:.3} us (dead time {:.3} us)", calc.frame_time_us(map, true)?, calc.deadtime_us(map)?);
    println!("   Frame rate:        {:.2} fps depth, {:.2} fps raw", depth_fps, raw_fps);
    println!("   ROI:               {}", calc.roi(map)?);
    println!("   Binning mode:      {}", calc.binning(map)?);
    println!("   Image size:        {}", calc.image_size(map)?);
    Ok(())
}

pub fn print_warnings(warnings: &Warnings) {
    for warning in warnings {
        println!("⚠️ {}", warning);
    }
}
