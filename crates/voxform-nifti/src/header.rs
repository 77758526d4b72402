//! Voxel-to-world affine derived from NIfTI-1 header fields.

use nifti::NiftiHeader;
use voxform_core::Affine;

/// `NIFTI_XFORM_ALIGNED_ANAT`, used when a header gains an sform on save.
const XFORM_ALIGNED_ANAT: i16 = 2;

/// The header's voxel-to-world transform.
///
/// Preference order follows the NIfTI-1 standard: the sform when
/// `sform_code > 0`, then the quaternion qform when `qform_code > 0`, and
/// finally a pixdim scaling with no rotation or offset.
pub fn header_affine(header: &NiftiHeader) -> Affine {
    if header.sform_code > 0 {
        let row = |r: [f32; 4]| r.map(f64::from);
        return Affine::from_rows([row(header.srow_x), row(header.srow_y), row(header.srow_z)]);
    }
    let [dx, dy, dz] = [1, 2, 3].map(|i| f64::from(header.pixdim[i]));
    if header.qform_code > 0 {
        return qform_affine(header, [dx, dy, dz]);
    }
    Affine::from_rows([
        [dx, 0.0, 0.0, 0.0],
        [0.0, dy, 0.0, 0.0],
        [0.0, 0.0, dz, 0.0],
    ])
}

fn qform_affine(header: &NiftiHeader, [dx, dy, dz]: [f64; 3]) -> Affine {
    let b = f64::from(header.quatern_b);
    let c = f64::from(header.quatern_c);
    let d = f64::from(header.quatern_d);
    let a = (1.0 - (b * b + c * c + d * d)).max(0.0).sqrt();
    // pixdim[0] carries the handedness of the slice axis.
    let qfac = if header.pixdim[0] < 0.0 { -1.0 } else { 1.0 };

    let r = [
        [
            a * a + b * b - c * c - d * d,
            2.0 * (b * c - a * d),
            2.0 * (b * d + a * c),
        ],
        [
            2.0 * (b * c + a * d),
            a * a + c * c - b * b - d * d,
            2.0 * (c * d - a * b),
        ],
        [
            2.0 * (b * d - a * c),
            2.0 * (c * d + a * b),
            a * a + d * d - c * c - b * b,
        ],
    ];
    let scale = [dx, dy, dz * qfac];
    let offset = [
        f64::from(header.quatern_x),
        f64::from(header.quatern_y),
        f64::from(header.quatern_z),
    ];
    let row = |i: usize| {
        [
            r[i][0] * scale[0],
            r[i][1] * scale[1],
            r[i][2] * scale[2],
            offset[i],
        ]
    };
    Affine::from_rows([row(0), row(1), row(2)])
}

/// Store `affine` in the header's sform, leaving the qform untouched.
pub fn write_affine(header: &mut NiftiHeader, affine: &Affine) {
    let [x, y, z] = affine.to_rows();
    let row = |r: [f64; 4]| r.map(|v| v as f32);
    header.srow_x = row(x);
    header.srow_y = row(y);
    header.srow_z = row(z);
    if header.sform_code <= 0 {
        header.sform_code = XFORM_ALIGNED_ANAT;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_rows_close(got: [[f64; 4]; 3], want: [[f64; 4]; 3]) {
        for (g, w) in got.iter().flatten().zip(want.iter().flatten()) {
            assert!((g - w).abs() < 1e-6, "got {got:?}, want {want:?}");
        }
    }

    #[test]
    fn test_sform_takes_precedence() {
        let header = NiftiHeader {
            sform_code: 1,
            qform_code: 1,
            srow_x: [2.0, 0.0, 0.0, -90.0],
            srow_y: [0.0, 2.0, 0.0, -126.0],
            srow_z: [0.0, 0.0, 2.0, -72.0],
            quatern_b: 1.0,
            ..NiftiHeader::default()
        };
        assert_rows_close(
            header_affine(&header).to_rows(),
            [
                [2.0, 0.0, 0.0, -90.0],
                [0.0, 2.0, 0.0, -126.0],
                [0.0, 0.0, 2.0, -72.0],
            ],
        );
    }

    #[test]
    fn test_qform_identity_quaternion_scales_by_pixdim() {
        let header = NiftiHeader {
            sform_code: 0,
            qform_code: 1,
            pixdim: [-1.0, 0.9, 0.9, 3.0, 0.0, 0.0, 0.0, 0.0],
            quatern_x: 10.0,
            quatern_y: 20.0,
            quatern_z: 30.0,
            ..NiftiHeader::default()
        };
        assert_rows_close(
            header_affine(&header).to_rows(),
            [
                [0.9, 0.0, 0.0, 10.0],
                [0.0, 0.9, 0.0, 20.0],
                [0.0, 0.0, -3.0, 30.0],
            ],
        );
    }

    #[test]
    fn test_qform_rotation_about_z() {
        // 90 degrees about z: (b, c, d) = (0, 0, sin 45).
        let header = NiftiHeader {
            sform_code: 0,
            qform_code: 1,
            pixdim: [1.0, 1.0, 2.0, 1.0, 0.0, 0.0, 0.0, 0.0],
            quatern_d: std::f32::consts::FRAC_1_SQRT_2,
            ..NiftiHeader::default()
        };
        assert_rows_close(
            header_affine(&header).to_rows(),
            [
                [0.0, -2.0, 0.0, 0.0],
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
            ],
        );
    }

    #[test]
    fn test_no_transform_falls_back_to_pixdim() {
        let header = NiftiHeader {
            sform_code: 0,
            qform_code: 0,
            pixdim: [1.0, 1.5, 1.5, 4.0, 0.0, 0.0, 0.0, 0.0],
            ..NiftiHeader::default()
        };
        assert_eq!(header_affine(&header).voxel_sizes(), [1.5, 1.5, 4.0]);
    }

    #[test]
    fn test_write_affine_enables_sform() {
        let mut header = NiftiHeader {
            sform_code: 0,
            ..NiftiHeader::default()
        };
        let affine = Affine::from_rows([
            [1.0, 0.0, 0.0, 5.0],
            [0.0, 1.0, 0.0, 6.0],
            [0.0, 0.0, 1.0, 7.0],
        ]);
        write_affine(&mut header, &affine);
        assert_eq!(header.sform_code, XFORM_ALIGNED_ANAT);
        assert_eq!(header_affine(&header), affine);
    }
}
