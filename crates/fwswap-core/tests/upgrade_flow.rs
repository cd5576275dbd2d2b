//! End-to-end upgrade flow: multipart body -> container parse -> swap.

use fwswap_core::prelude::*;
use fwswap_core::image::DEFAULT_HWID;

const TOKEN: &str = "---------------------------735323031399963166993862150";

/// Recording flasher for observing erase/write traffic.
#[derive(Debug, Default)]
struct RecordingFlasher {
    erased: Vec<FlashTarget>,
    written: Vec<(String, Vec<u8>)>,
}

impl Flasher for RecordingFlasher {
    fn erase(&mut self, target: &FlashTarget) -> std::result::Result<(), FlashError> {
        self.erased.push(target.clone());
        Ok(())
    }

    fn write(&mut self, target: &FlashTarget, data: &[u8]) -> std::result::Result<(), FlashError> {
        self.written.push((target.device.clone(), data.to_vec()));
        Ok(())
    }
}

fn multipart_body(payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{TOKEN}\r\n").as_bytes());
    body.extend_from_slice(
        b"Content-Disposition: form-data; name=\"firmware\"; filename=\"fw.img\"\r\n",
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n");
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(payload);
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(format!("--{TOKEN}--\r\n").as_bytes());
    body
}

fn kernel_image() -> Vec<u8> {
    let mut builder = ImageBuilder::new(DEFAULT_HWID);
    builder
        .add_part("kernel", vec![0x5A; 1024])
        .expect("one part fits");
    builder.build()
}

#[test]
fn http_upload_flips_the_kernel_pointer() -> fwswap_core::Result<()> {
    let image = kernel_image();
    let body = multipart_body(&image);

    // Transport validation as the CGI handler would do it.
    let request = CgiRequest {
        method: "POST".to_string(),
        content_type: format!("multipart/form-data; boundary={TOKEN}"),
        content_length: body.len().to_string(),
    };
    let validated = request.validate()?;
    assert_eq!(validated.length as usize, body.len());

    let mut reader: &[u8] = &body;
    let buffered = fwswap_core::cgi::read_body(&mut reader, validated.length)?;

    let file = fwswap_core::multipart::extract(&buffered, &validated.boundary)?;
    assert_eq!(file.filename.as_deref(), Some("fw.img"));
    assert_eq!(file.data, image.as_slice());

    let parsed = FirmwareImage::parse(file.data, DEFAULT_HWID)?;

    let table = ActionTable::parse("kernel:mtd2:mtd3\n")?;
    let store = MemoryEnvStore::new();
    store.seed("kernel_mtdpart", "mtd2");

    let mut flasher = RecordingFlasher::default();
    let report = SwapController::new(&table, &mut flasher).apply(&parsed.parts, &store)?;

    assert_eq!(store.get("kernel_mtdpart").as_deref(), Some("mtd3"));
    assert_eq!(report.flips.len(), 1);
    assert_eq!(flasher.erased.len(), 1);
    assert_eq!(flasher.written.len(), 1);
    assert_eq!(flasher.written[0].0, "mtd3");
    assert_eq!(flasher.written[0].1, vec![0x5A; 1024]);
    Ok(())
}

#[test]
fn every_pointer_toggles_exactly_once() -> fwswap_core::Result<()> {
    let mut builder = ImageBuilder::new(DEFAULT_HWID);
    builder.add_part("kernel", vec![1; 64]).expect("fits");
    builder.add_part("rootfs", vec![2; 128]).expect("fits");
    builder.add_part("dtb", vec![3; 32]).expect("fits");
    let image = builder.build();

    let parsed = FirmwareImage::parse(&image, DEFAULT_HWID)?;

    let table =
        ActionTable::parse("kernel:mtd2:mtd3\nrootfs:rootfs_a:rootfs_b:ubi\ndtb:mtd6:mtd7\n")?;
    let store = MemoryEnvStore::new();
    store.seed("kernel_mtdpart", "mtd3");
    store.seed("rootfs_ubivol", "rootfs_a");
    store.seed("dtb_mtdpart", "mtd6");

    let mut flasher = RecordingFlasher::default();
    let report = SwapController::new(&table, &mut flasher).apply(&parsed.parts, &store)?;

    assert_eq!(report.flips.len(), 3);
    assert_eq!(store.get("kernel_mtdpart").as_deref(), Some("mtd2"));
    assert_eq!(store.get("rootfs_ubivol").as_deref(), Some("rootfs_b"));
    assert_eq!(store.get("dtb_mtdpart").as_deref(), Some("mtd7"));
    Ok(())
}

#[test]
fn corrupted_checksum_blocks_every_part() {
    let mut builder = ImageBuilder::new(DEFAULT_HWID);
    builder.add_part("kernel", vec![1; 64]).expect("fits");
    builder.add_part("rootfs", vec![2; 128]).expect("fits");
    let mut image = builder.build();

    // Corrupt one byte of the *second* part's data.
    let last = image.len() - 1;
    image[last] ^= 0xFF;

    // The whole parse fails; the intact first part is not exposed either.
    let err = FirmwareImage::parse(&image, DEFAULT_HWID).expect_err("corrupt image");
    assert_eq!(
        err,
        ImageError::ChecksumMismatch {
            part: "rootfs".to_string()
        }
    );
}

#[test]
fn hwid_mismatch_never_reaches_the_flasher() {
    let image = kernel_image();
    let err = FirmwareImage::parse(&image, 0x4242).expect_err("wrong device");
    assert!(matches!(err, ImageError::BadHwid { .. }));
    // Parsing is the gate: with no parse result there is nothing to apply,
    // so no flasher call and no pointer movement can occur.
}

#[test]
fn multipart_without_content_type_never_reaches_the_container() {
    let image = kernel_image();
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{TOKEN}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Disposition: form-data; name=\"firmware\"\r\n");
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(&image);
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(format!("--{TOKEN}--\r\n").as_bytes());

    let err = fwswap_core::multipart::extract(&body, TOKEN).expect_err("no content type");
    assert_eq!(err, ProtocolError::UnsupportedPartType);
}

#[test]
fn truncated_body_is_always_rejected() {
    let image = kernel_image();
    let full = multipart_body(&image);

    // Cut the body anywhere inside the payload: the closing boundary is
    // gone and extraction must fail, never returning a partial payload.
    for cut in [full.len() - TOKEN.len() - 8, full.len() / 2] {
        let err =
            fwswap_core::multipart::extract(&full[..cut], TOKEN).expect_err("truncated body");
        assert_eq!(err, ProtocolError::TruncatedBody);
    }
}

mod extractor_properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Payloads that do not end in CRLF come back byte-identical,
        /// including the 0- and 1-byte cases that used to underflow.
        #[test]
        fn short_payloads_survive_unmodified(payload in proptest::collection::vec(any::<u8>(), 0..64)) {
            // Keep the boundary out of the payload and avoid a trailing
            // CRLF so no trim applies.
            prop_assume!(!payload.windows(2).any(|w| w == b"--"));
            prop_assume!(!payload.ends_with(b"\r\n"));

            let body = multipart_body(&payload);
            let file = fwswap_core::multipart::extract(&body, TOKEN)
                .expect("well-formed body");
            prop_assert_eq!(file.data, payload.as_slice());
        }

        /// A trailing CRLF inside the payload is preserved: only the one
        /// framing CRLF added by the transport is stripped.
        #[test]
        fn crlf_tail_strips_exactly_once(payload in proptest::collection::vec(any::<u8>(), 0..64)) {
            prop_assume!(!payload.windows(2).any(|w| w == b"--"));

            let mut with_tail = payload.clone();
            with_tail.extend_from_slice(b"\r\n");

            let body = multipart_body(&with_tail);
            let file = fwswap_core::multipart::extract(&body, TOKEN)
                .expect("well-formed body");
            prop_assert_eq!(file.data, with_tail.as_slice());
        }

        /// Round-trip: building an image with arbitrary part contents and
        /// parsing it back preserves the part table.
        #[test]
        fn image_round_trip(
            contents in proptest::collection::vec(
                proptest::collection::vec(any::<u8>(), 1..512),
                1..4,
            )
        ) {
            let mut builder = ImageBuilder::new(DEFAULT_HWID);
            for (i, data) in contents.iter().enumerate() {
                builder.add_part(&format!("part{i}"), data.clone()).expect("fits");
            }
            let image = builder.build();
            let parsed = FirmwareImage::parse(&image, DEFAULT_HWID).expect("valid image");

            prop_assert_eq!(parsed.parts.len(), contents.len());
            for (i, data) in contents.iter().enumerate() {
                prop_assert_eq!(parsed.parts[i].name, format!("part{i}"));
                prop_assert_eq!(parsed.parts[i].data, data.as_slice());
            }
        }
    }
}
