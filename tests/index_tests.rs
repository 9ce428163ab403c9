//! Index width selection tests.

use rstest::rstest;

use deferred_scene::resources::IndexFormat;
use deferred_scene::RenderError;

#[rstest]
#[case::empty(IndexFormat::Uint8, 0, IndexFormat::Uint8)]
#[case::last_byte(IndexFormat::Uint8, 255, IndexFormat::Uint8)]
#[case::first_short(IndexFormat::Uint8, 256, IndexFormat::Uint16)]
#[case::last_short(IndexFormat::Uint8, 65_535, IndexFormat::Uint16)]
#[case::first_int(IndexFormat::Uint8, 65_536, IndexFormat::Uint32)]
#[case::floor_short(IndexFormat::Uint16, 10, IndexFormat::Uint16)]
#[case::floor_int(IndexFormat::Uint32, 10, IndexFormat::Uint32)]
#[case::floor_below_count(IndexFormat::Uint16, 100_000, IndexFormat::Uint32)]
fn test_for_count(
    #[case] minimum: IndexFormat,
    #[case] count: u64,
    #[case] expected: IndexFormat,
) {
    assert_eq!(IndexFormat::for_count(minimum, count), expected);
}

#[rstest]
#[case::byte(IndexFormat::Uint8, 1)]
#[case::short(IndexFormat::Uint16, 2)]
#[case::int(IndexFormat::Uint32, 4)]
fn test_largest_count_of_each_width(#[case] format: IndexFormat, #[case] size: usize) {
    // `max_index` elements address indices up to `max_index - 1`
    let count = u64::from(format.max_index());
    assert_eq!(IndexFormat::for_count(IndexFormat::Uint8, count), format);
    assert_eq!(format.byte_size(), size);
    let bytes = format.write_indices(&[0, format.max_index()]).unwrap();
    assert_eq!(bytes.len(), 2 * size);
}

#[test]
fn test_write_rejects_wide_index() {
    assert_eq!(
        IndexFormat::Uint8.write_indices(&[1, 256]),
        Err(RenderError::IndexOutOfRange {
            index: 256,
            width: 8
        })
    );
    assert_eq!(
        IndexFormat::Uint16.write_indices(&[3, 2]).unwrap(),
        vec![3, 0, 2, 0]
    );
}
