//! Conversions between RHI enums and their wgpu counterparts.

use lume_rhi::{CompareOp, PixelFormat, RhiError, RhiResult, StencilOp, StencilParams};

/// Depth/stencil format used for every pooled depth buffer.
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24PlusStencil8;

/// `hw_gamma_write` selects the sRGB variant of 8-bit color formats.
pub fn texture_format(format: PixelFormat, hw_gamma_write: bool) -> RhiResult<wgpu::TextureFormat> {
    use wgpu::TextureFormat as F;
    Ok(match (format, hw_gamma_write) {
        (PixelFormat::Rgba8Unorm, false) => F::Rgba8Unorm,
        (PixelFormat::Rgba8Unorm, true) | (PixelFormat::Rgba8UnormSrgb, _) => F::Rgba8UnormSrgb,
        (PixelFormat::Bgra8Unorm, false) => F::Bgra8Unorm,
        (PixelFormat::Bgra8Unorm, true) | (PixelFormat::Bgra8UnormSrgb, _) => F::Bgra8UnormSrgb,
        (PixelFormat::R16Float, _) => F::R16Float,
        (PixelFormat::R32Float, _) => F::R32Float,
        (PixelFormat::Rg16Float, _) => F::Rg16Float,
        (PixelFormat::Rgba16Float, _) => F::Rgba16Float,
        (PixelFormat::Rgba32Float, _) => F::Rgba32Float,
        (PixelFormat::D32Float, _) => F::Depth32Float,
        (PixelFormat::D24UnormS8Uint, _) => F::Depth24PlusStencil8,
        (PixelFormat::Unknown, _) => {
            return Err(RhiError::Unsupported("unresolved pixel format".to_string()));
        }
    })
}

/// Formats usable as write-only storage textures without optional device features.
pub fn supports_storage(format: wgpu::TextureFormat) -> bool {
    matches!(
        format,
        wgpu::TextureFormat::Rgba8Unorm
            | wgpu::TextureFormat::Rgba16Float
            | wgpu::TextureFormat::Rgba32Float
            | wgpu::TextureFormat::R32Float
    )
}

pub fn compare_function(op: CompareOp) -> wgpu::CompareFunction {
    match op {
        CompareOp::Never => wgpu::CompareFunction::Never,
        CompareOp::Less => wgpu::CompareFunction::Less,
        CompareOp::Equal => wgpu::CompareFunction::Equal,
        CompareOp::LessOrEqual => wgpu::CompareFunction::LessEqual,
        CompareOp::Greater => wgpu::CompareFunction::Greater,
        CompareOp::NotEqual => wgpu::CompareFunction::NotEqual,
        CompareOp::GreaterOrEqual => wgpu::CompareFunction::GreaterEqual,
        CompareOp::Always => wgpu::CompareFunction::Always,
    }
}

pub fn stencil_operation(op: StencilOp) -> wgpu::StencilOperation {
    match op {
        StencilOp::Keep => wgpu::StencilOperation::Keep,
        StencilOp::Zero => wgpu::StencilOperation::Zero,
        StencilOp::Replace => wgpu::StencilOperation::Replace,
        StencilOp::IncrementClamp => wgpu::StencilOperation::IncrementClamp,
        StencilOp::DecrementClamp => wgpu::StencilOperation::DecrementClamp,
        StencilOp::Invert => wgpu::StencilOperation::Invert,
        StencilOp::IncrementWrap => wgpu::StencilOperation::IncrementWrap,
        StencilOp::DecrementWrap => wgpu::StencilOperation::DecrementWrap,
    }
}

/// Disabled stencil state maps to wgpu's pass-through default.
pub fn stencil_state(params: &StencilParams) -> wgpu::StencilState {
    if !params.enabled {
        return wgpu::StencilState::default();
    }
    let face = wgpu::StencilFaceState {
        compare: compare_function(params.compare),
        fail_op: stencil_operation(params.fail_op),
        depth_fail_op: stencil_operation(params.depth_fail_op),
        pass_op: stencil_operation(params.pass_op),
    };
    wgpu::StencilState {
        front: face,
        back: face,
        read_mask: params.read_mask,
        write_mask: params.write_mask,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gamma_write_selects_srgb() {
        assert_eq!(
            texture_format(PixelFormat::Rgba8Unorm, true).unwrap(),
            wgpu::TextureFormat::Rgba8UnormSrgb
        );
        assert_eq!(
            texture_format(PixelFormat::Bgra8Unorm, false).unwrap(),
            wgpu::TextureFormat::Bgra8Unorm
        );
        assert_eq!(
            texture_format(PixelFormat::Rgba16Float, true).unwrap(),
            wgpu::TextureFormat::Rgba16Float
        );
        assert!(texture_format(PixelFormat::Unknown, false).is_err());
    }

    #[test]
    fn disabled_stencil_is_pass_through() {
        let state = stencil_state(&StencilParams::default());
        assert_eq!(state, wgpu::StencilState::default());

        let enabled = StencilParams {
            enabled: true,
            compare: CompareOp::Equal,
            pass_op: StencilOp::Replace,
            read_mask: 0xFF,
            ..StencilParams::default()
        };
        let state = stencil_state(&enabled);
        assert_eq!(state.front.compare, wgpu::CompareFunction::Equal);
        assert_eq!(state.back.pass_op, wgpu::StencilOperation::Replace);
        assert_eq!(state.read_mask, 0xFF);
    }

    #[test]
    fn storage_formats() {
        assert!(supports_storage(wgpu::TextureFormat::Rgba16Float));
        assert!(!supports_storage(wgpu::TextureFormat::Bgra8Unorm));
    }
}
