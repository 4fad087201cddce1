//! H.264 sequence parameter set decoding (ITU-T H.264 §7.3.2.1.1).
//!
//! Only the fields needed to recover the coded frame size and, when VUI
//! timing is present, the frame rate are kept; everything else is walked
//! over in syntax order.

use super::bits::{BitReader, remove_emulation_prevention};
use crate::error::{IngestError, Result, SpsErrorKind};

/// NAL unit type of a sequence parameter set.
pub const NAL_TYPE_SPS: u8 = 7;

/// Profiles whose SPS carries `chroma_format_idc` and the bit-depth /
/// scaling-matrix block.
const HIGH_PROFILES: [u32; 12] = [100, 110, 122, 244, 44, 83, 86, 118, 128, 138, 139, 144];

/// Frame geometry recovered from an SPS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpsParameters {
    pub width: u32,
    pub height: u32,
    /// Present only when the VUI carries timing info.
    pub fps: Option<u32>,
}

impl SpsParameters {
    /// Decode an SPS NAL unit, NAL header byte included.
    ///
    /// Fails with [`SpsErrorKind::NotSps`] when the header's type is not 7,
    /// and with [`SpsErrorKind::Exhausted`] when the bitstream ends before
    /// the resolution fields.
    pub fn parse(nal: &[u8]) -> Result<Self> {
        let header = *nal.first().ok_or(IngestError::SpsDecode {
            kind: SpsErrorKind::Exhausted,
        })?;
        let nal_type = header & 0x1f;
        if nal_type != NAL_TYPE_SPS {
            return Err(IngestError::SpsDecode {
                kind: SpsErrorKind::NotSps(nal_type),
            });
        }

        let rbsp = remove_emulation_prevention(&nal[1..]);
        let mut r = BitReader::new(&rbsp);

        let profile_idc = r.read_bits(8)?;
        // constraint_set0..5 flags + reserved_zero_2bits
        r.skip_bits(8)?;
        let level_idc = r.read_bits(8)?;
        let _seq_parameter_set_id = r.read_ue()?;

        if HIGH_PROFILES.contains(&profile_idc) {
            let chroma_format_idc = r.read_ue()?;
            if chroma_format_idc == 3 {
                let _separate_colour_plane_flag = r.read_flag()?;
            }
            let _bit_depth_luma_minus8 = r.read_ue()?;
            let _bit_depth_chroma_minus8 = r.read_ue()?;
            let _qpprime_y_zero_transform_bypass_flag = r.read_flag()?;
            if r.read_flag()? {
                let lists = if chroma_format_idc == 3 { 12 } else { 8 };
                for i in 0..lists {
                    if r.read_flag()? {
                        skip_scaling_list(&mut r, if i < 6 { 16 } else { 64 })?;
                    }
                }
            }
        }

        let _log2_max_frame_num_minus4 = r.read_ue()?;
        let pic_order_cnt_type = r.read_ue()?;
        if pic_order_cnt_type == 0 {
            let _log2_max_pic_order_cnt_lsb_minus4 = r.read_ue()?;
        } else if pic_order_cnt_type == 1 {
            let _delta_pic_order_always_zero_flag = r.read_flag()?;
            let _offset_for_non_ref_pic = r.read_se()?;
            let _offset_for_top_to_bottom_field = r.read_se()?;
            let cycle = r.read_ue()?;
            for _ in 0..cycle {
                let _offset_for_ref_frame = r.read_se()?;
            }
        }
        let _max_num_ref_frames = r.read_ue()?;
        let _gaps_in_frame_num_value_allowed_flag = r.read_flag()?;
        let pic_width_in_mbs_minus1 = r.read_ue()?;
        let pic_height_in_map_units_minus1 = r.read_ue()?;

        let mut params = SpsParameters {
            width: pic_width_in_mbs_minus1.saturating_add(1).saturating_mul(16),
            height: pic_height_in_map_units_minus1.saturating_add(1).saturating_mul(16),
            fps: None,
        };

        tracing::debug!(
            profile_idc,
            level_idc,
            width = params.width,
            height = params.height,
            "SPS resolution decoded"
        );

        // Resolution is known; a truncated tail only loses the frame rate.
        match read_fps(&mut r) {
            Ok(fps) => params.fps = fps,
            Err(e) => tracing::debug!(error = %e, "SPS tail truncated, frame rate unknown"),
        }

        Ok(params)
    }
}

/// `scaling_list()` (H.264 §7.3.2.1.1.1); values are discarded.
fn skip_scaling_list(r: &mut BitReader<'_>, size: usize) -> Result<()> {
    let mut last_scale = 8i32;
    let mut next_scale = 8i32;
    for _ in 0..size {
        if next_scale != 0 {
            let delta_scale = r.read_se()?;
            next_scale = (last_scale + delta_scale + 256).rem_euclid(256);
        }
        if next_scale != 0 {
            last_scale = next_scale;
        }
    }
    Ok(())
}

/// Walk the fields after the picture size through the VUI timing info.
fn read_fps(r: &mut BitReader<'_>) -> Result<Option<u32>> {
    let frame_mbs_only_flag = r.read_flag()?;
    if !frame_mbs_only_flag {
        let _mb_adaptive_frame_field_flag = r.read_flag()?;
    }
    let _direct_8x8_inference_flag = r.read_flag()?;
    if r.read_flag()? {
        // frame_crop_{left,right,top,bottom}_offset
        for _ in 0..4 {
            r.read_ue()?;
        }
    }

    let vui_parameters_present_flag = r.read_flag()?;
    if !vui_parameters_present_flag {
        return Ok(None);
    }

    if r.read_flag()? {
        let aspect_ratio_idc = r.read_bits(8)?;
        if aspect_ratio_idc == 255 {
            // sar_width, sar_height
            r.skip_bits(32)?;
        }
    }
    if r.read_flag()? {
        let _overscan_appropriate_flag = r.read_flag()?;
    }
    if r.read_flag()? {
        // video_format, video_full_range_flag
        r.skip_bits(4)?;
        if r.read_flag()? {
            // colour_primaries, transfer_characteristics, matrix_coefficients
            r.skip_bits(24)?;
        }
    }
    if r.read_flag()? {
        let _chroma_sample_loc_type_top_field = r.read_ue()?;
        let _chroma_sample_loc_type_bottom_field = r.read_ue()?;
    }

    let timing_info_present_flag = r.read_flag()?;
    if !timing_info_present_flag {
        return Ok(None);
    }
    let num_units_in_tick = r.read_bits(32)?;
    let time_scale = r.read_bits(32)?;
    let fixed_frame_rate_flag = r.read_flag()?;

    if num_units_in_tick == 0 {
        tracing::warn!(time_scale, "SPS timing info with zero num_units_in_tick");
        return Ok(None);
    }
    let mut fps = time_scale / num_units_in_tick;
    if fixed_frame_rate_flag {
        fps /= 2;
    }
    Ok(Some(fps))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::bits::BitWriter;

    /// Baseline SPS body up to and including the picture size.
    fn baseline_prefix(w: &mut BitWriter, width_mbs_minus1: u32, height_mus_minus1: u32) {
        w.bits(66, 8) // profile_idc
            .bits(0xC0, 8) // constraint flags
            .bits(30, 8) // level_idc
            .ue(0) // seq_parameter_set_id
            .ue(0) // log2_max_frame_num_minus4
            .ue(0) // pic_order_cnt_type
            .ue(0) // log2_max_pic_order_cnt_lsb_minus4
            .ue(1) // max_num_ref_frames
            .bit(false) // gaps_in_frame_num_value_allowed_flag
            .ue(width_mbs_minus1)
            .ue(height_mus_minus1);
    }

    fn with_nal_header(body: Vec<u8>) -> Vec<u8> {
        let mut nal = vec![0x67];
        nal.extend(body);
        nal
    }

    #[test]
    fn baseline_640x480_without_vui() {
        let mut w = BitWriter::new();
        baseline_prefix(&mut w, 39, 29);
        w.bit(true) // frame_mbs_only_flag
            .bit(true) // direct_8x8_inference_flag
            .bit(false) // frame_cropping_flag
            .bit(false); // vui_parameters_present_flag
        let sps = SpsParameters::parse(&with_nal_header(w.finish())).unwrap();
        assert_eq!(sps.width, 640);
        assert_eq!(sps.height, 480);
        assert_eq!(sps.fps, None);
    }

    #[test]
    fn vui_timing_gives_fps() {
        let mut w = BitWriter::new();
        baseline_prefix(&mut w, 79, 44);
        w.bit(true)
            .bit(true)
            .bit(false)
            .bit(true) // vui_parameters_present_flag
            .bit(false) // aspect_ratio_info_present_flag
            .bit(false) // overscan_info_present_flag
            .bit(false) // video_signal_type_present_flag
            .bit(false) // chroma_loc_info_present_flag
            .bit(true) // timing_info_present_flag
            .bits(1, 32) // num_units_in_tick
            .bits(50, 32) // time_scale
            .bit(true); // fixed_frame_rate_flag
        let sps = SpsParameters::parse(&with_nal_header(w.finish())).unwrap();
        assert_eq!((sps.width, sps.height), (1280, 720));
        assert_eq!(sps.fps, Some(25));
    }

    #[test]
    fn vui_fps_without_fixed_rate_flag() {
        let mut w = BitWriter::new();
        baseline_prefix(&mut w, 39, 29);
        w.bit(true)
            .bit(true)
            .bit(true) // frame_cropping_flag
            .ue(0)
            .ue(0)
            .ue(0)
            .ue(4)
            .bit(true) // vui
            .bit(true) // aspect_ratio_info_present_flag
            .bits(255, 8)
            .bits(1, 16)
            .bits(1, 16)
            .bit(false)
            .bit(true) // video_signal_type_present_flag
            .bits(5, 3)
            .bit(false)
            .bit(true) // colour_description_present_flag
            .bits(1, 8)
            .bits(1, 8)
            .bits(1, 8)
            .bit(false)
            .bit(true)
            .bits(1001, 32)
            .bits(30000, 32)
            .bit(false);
        let sps = SpsParameters::parse(&with_nal_header(w.finish())).unwrap();
        assert_eq!(sps.fps, Some(29));
    }

    #[test]
    fn high_profile_with_scaling_matrix() {
        let mut w = BitWriter::new();
        w.bits(100, 8)
            .bits(0, 8)
            .bits(40, 8)
            .ue(0) // seq_parameter_set_id
            .ue(1) // chroma_format_idc 4:2:0
            .ue(0) // bit_depth_luma_minus8
            .ue(0) // bit_depth_chroma_minus8
            .bit(false) // qpprime_y_zero_transform_bypass_flag
            .bit(true); // seq_scaling_matrix_present_flag
        // first list present with a single delta that zeroes next_scale,
        // the remaining seven absent
        w.bit(true).se(-8);
        for _ in 1..8 {
            w.bit(false);
        }
        w.ue(0) // log2_max_frame_num_minus4
            .ue(2) // pic_order_cnt_type
            .ue(4) // max_num_ref_frames
            .bit(false)
            .ue(119)
            .ue(67)
            .bit(true)
            .bit(true)
            .bit(false)
            .bit(false);
        let sps = SpsParameters::parse(&with_nal_header(w.finish())).unwrap();
        assert_eq!((sps.width, sps.height), (1920, 1088));
    }

    #[test]
    fn pic_order_cnt_type_1() {
        let mut w = BitWriter::new();
        w.bits(77, 8)
            .bits(0, 8)
            .bits(31, 8)
            .ue(0)
            .ue(0)
            .ue(1) // pic_order_cnt_type
            .bit(false)
            .se(-2)
            .se(3)
            .ue(2)
            .se(1)
            .se(-1)
            .ue(1)
            .bit(false)
            .ue(21)
            .ue(17)
            .bit(true)
            .bit(true)
            .bit(false)
            .bit(false);
        let sps = SpsParameters::parse(&with_nal_header(w.finish())).unwrap();
        assert_eq!((sps.width, sps.height), (352, 288));
    }

    #[test]
    fn real_world_baseline_sps() {
        // x264 baseline 640x480 level 3.0, no VUI
        let sps = [0x67, 0x42, 0xC0, 0x1E, 0xDA, 0x02, 0x80, 0xF6, 0x40];
        let params = SpsParameters::parse(&sps).unwrap();
        assert_eq!((params.width, params.height), (640, 480));
    }

    #[test]
    fn non_sps_nal_rejected() {
        let err = SpsParameters::parse(&[0x68, 0xCE, 0x38, 0x80]).unwrap_err();
        assert!(matches!(
            err,
            IngestError::SpsDecode {
                kind: SpsErrorKind::NotSps(8)
            }
        ));
    }

    #[test]
    fn truncated_sps_rejected() {
        let err = SpsParameters::parse(&[0x67, 0x42, 0xC0]).unwrap_err();
        assert!(matches!(
            err,
            IngestError::SpsDecode {
                kind: SpsErrorKind::Exhausted
            }
        ));
    }

    #[test]
    fn empty_input_rejected() {
        assert!(SpsParameters::parse(&[]).is_err());
    }
}
