// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use std::sync::Arc;

use crate::mixer::avatar::{parse_image_size, AvatarCache};
use crate::tests::testing;
use crate::Size;

const STILL: Size = Size {
    width: 32,
    height: 24,
};

#[test]
fn test_parse_image_size() {
    testing::init();

    assert_eq!(
        parse_image_size("face.320x240.yuv"),
        Some(Size {
            width: 320,
            height: 240
        })
    );
    assert_eq!(
        parse_image_size("/srv/avatars/room1.64x36.raw"),
        Some(Size {
            width: 64,
            height: 36
        })
    );

    // no size annotation at all
    assert_eq!(parse_image_size("face"), None);
    assert_eq!(parse_image_size("face.yuv"), None);
    // no closing delimiter after the height
    assert_eq!(parse_image_size("face.320x240"), None);
    // digits must span the whole field
    assert_eq!(parse_image_size("face.3a0x240.yuv"), None);
    assert_eq!(parse_image_size("face.320x2b0.yuv"), None);
    // an earlier dot shifts the window off the numbers
    assert_eq!(parse_image_size("a.b.320x240.yuv"), None);
}

#[test]
fn test_set_and_get_round_trip() {
    testing::init();

    let path = testing::write_avatar(STILL, 99);
    let url = path.to_str().unwrap();

    let cache = AvatarCache::new();
    assert!(cache.set_avatar(0, url));

    let frame = cache.frame(0).unwrap();
    assert_eq!(frame.size(), STILL);
    assert!(frame.data_y().iter().all(|&value| value == 99));
    assert!(frame.data_u().iter().all(|&value| value == 128));
}

#[test]
fn test_repeated_set_keeps_cache() {
    testing::init();

    let path = testing::write_avatar(STILL, 40);
    let url = path.to_str().unwrap();

    let cache = AvatarCache::new();
    cache.set_avatar(0, url);
    let first = cache.frame(0).unwrap();

    cache.set_avatar(0, url);
    let second = cache.frame(0).unwrap();
    assert!(Arc::ptr_eq(&first, &second), "still was decoded twice");
}

#[test]
fn test_eviction_spares_shared_urls() {
    testing::init();

    let shared = testing::write_avatar(STILL, 50);
    let other = testing::write_avatar(STILL, 60);
    let shared_url = shared.to_str().unwrap();
    let other_url = other.to_str().unwrap();

    let cache = AvatarCache::new();
    cache.set_avatar(0, shared_url);
    cache.set_avatar(1, shared_url);
    let before = cache.frame(1).unwrap();

    // slot 0 moves away, slot 1 still references the shared still
    cache.set_avatar(0, other_url);
    let after = cache.frame(1).unwrap();
    assert!(Arc::ptr_eq(&before, &after));

    // last reference gone: the next lookup decodes anew
    cache.unset_avatar(1);
    cache.set_avatar(1, shared_url);
    let redecoded = cache.frame(1).unwrap();
    assert!(!Arc::ptr_eq(&before, &redecoded));
}

#[test]
fn test_wrong_file_size_yields_none() {
    testing::init();

    let path = testing::avatar_path(STILL);
    std::fs::write(&path, vec![0u8; 10]).unwrap();

    let cache = AvatarCache::new();
    cache.set_avatar(0, path.to_str().unwrap());
    assert!(cache.frame(0).is_none());
}

#[test]
fn test_missing_file_yields_none() {
    testing::init();

    let cache = AvatarCache::new();
    cache.set_avatar(0, "/nonexistent/face.320x240.yuv");
    assert!(cache.frame(0).is_none());
}

#[test]
fn test_unmapped_slot_yields_none() {
    testing::init();

    let cache = AvatarCache::new();
    assert!(cache.frame(7).is_none());
}

#[test]
fn test_failed_decode_is_cached_until_evicted() {
    testing::init();

    let path = testing::avatar_path(STILL);
    let url = path.to_str().unwrap();

    let cache = AvatarCache::new();
    cache.set_avatar(0, url);
    assert!(cache.frame(0).is_none());

    // the file shows up late, but the failure is cached per URL
    let w = STILL.width as usize;
    let h = STILL.height as usize;
    std::fs::write(&path, vec![128u8; w * h * 3 / 2]).unwrap();
    assert!(cache.frame(0).is_none());

    // eviction forgets the failure
    cache.unset_avatar(0);
    cache.set_avatar(0, url);
    assert!(cache.frame(0).is_some());
}
