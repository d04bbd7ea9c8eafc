// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use crate::mixer::{applier, InputRegistry};
use crate::tests::testing;
use crate::{LayoutEntry, LayoutSolution, Rational, Rect, Region, Size, VideoFrame};

fn rect(left: (u32, u32), top: (u32, u32), width: (u32, u32), height: (u32, u32)) -> Rect {
    Rect {
        left: Rational::new(left.0, left.1),
        top: Rational::new(top.0, top.1),
        width: Rational::new(width.0, width.1),
        height: Rational::new(height.0, height.1),
    }
}

fn entry(input: usize, rect: Rect) -> LayoutEntry {
    LayoutEntry {
        input,
        region: Region::new(rect),
    }
}

/// activate a slot and queue one flat picture on it
fn feed(registry: &InputRegistry, input: usize, size: Size, sync: bool, sync_timestamp: i64) {
    let channel = registry.channel(input).unwrap();
    channel.set_active(true);

    let picture = testing::solid_frame(size, testing::gray(sync_timestamp as u8));
    channel.push(&testing::source_frame(
        &picture,
        sync_timestamp as u32 * 90,
        sync,
        sync_timestamp,
    ));
}

#[test]
fn test_letterbox_single_input() {
    testing::init();

    let registry = InputRegistry::new(1);
    feed(
        &registry,
        0,
        Size {
            width: 320,
            height: 240,
        },
        false,
        200,
    );

    let mut buffer = VideoFrame::new(Size {
        width: 640,
        height: 360,
    });
    let layout: LayoutSolution = vec![entry(0, Rect::FULL)];

    applier::compose(&registry, &mut buffer, &layout, false);

    // 320x240 letterboxed into 640x360 becomes 480x360, centered at x = 80
    assert_eq!(testing::y_at(&buffer, 0, 0), 16);
    assert_eq!(testing::y_at(&buffer, 79, 180), 16);
    assert_eq!(testing::y_at(&buffer, 80, 0), 200);
    assert_eq!(testing::y_at(&buffer, 320, 180), 200);
    assert_eq!(testing::y_at(&buffer, 559, 359), 200);
    assert_eq!(testing::y_at(&buffer, 560, 180), 16);
    assert_eq!(testing::y_at(&buffer, 639, 359), 16);
}

#[test]
fn test_crop_fills_both_halves() {
    testing::init();

    let registry = InputRegistry::new(2);
    let camera = Size {
        width: 640,
        height: 480,
    };
    feed(&registry, 0, camera, false, 100);
    feed(&registry, 1, camera, false, 200);

    let mut buffer = VideoFrame::new(Size {
        width: 1280,
        height: 480,
    });
    let layout: LayoutSolution = vec![
        entry(0, rect((0, 1), (0, 1), (1, 2), (1, 1))),
        entry(1, rect((1, 2), (0, 1), (1, 2), (1, 1))),
    ];

    applier::compose(&registry, &mut buffer, &layout, true);

    // both halves are filled edge to edge, no letterbox bars
    assert_eq!(testing::y_at(&buffer, 0, 0), 100);
    assert_eq!(testing::y_at(&buffer, 639, 479), 100);
    assert_eq!(testing::y_at(&buffer, 640, 0), 200);
    assert_eq!(testing::y_at(&buffer, 1279, 479), 200);
}

#[test]
fn test_empty_sync_window_holds_fronts() {
    testing::init();

    let registry = InputRegistry::new(2);
    let picture = Size {
        width: 16,
        height: 16,
    };
    // the two queues do not overlap in sync timestamps
    for ts in 100..=103 {
        feed(&registry, 0, picture, true, ts);
    }
    for ts in 104..=107 {
        feed(&registry, 1, picture, true, ts);
    }

    let mut buffer = VideoFrame::new(testing::CANVAS);
    let layout: LayoutSolution = vec![
        entry(0, rect((0, 1), (0, 1), (1, 2), (1, 1))),
        entry(1, rect((1, 2), (0, 1), (1, 2), (1, 1))),
    ];

    applier::compose(&registry, &mut buffer, &layout, true);

    // both regions show their channel's front frame
    assert_eq!(testing::y_at(&buffer, 5, 5), 100);
    assert_eq!(testing::y_at(&buffer, 37, 5), 104);

    // and nothing was drained while waiting for overlap
    assert_eq!(
        registry.channel(0).unwrap().sync_timestamps(),
        vec![100, 101, 102, 103]
    );
    assert_eq!(
        registry.channel(1).unwrap().sync_timestamps(),
        vec![104, 105, 106, 107]
    );
}

#[test]
fn test_sync_channels_align_on_common_latest() {
    testing::init();

    let registry = InputRegistry::new(2);
    let picture = Size {
        width: 16,
        height: 16,
    };
    for ts in 1..=4 {
        feed(&registry, 0, picture, true, ts);
    }
    for ts in 2..=5 {
        feed(&registry, 1, picture, true, ts);
    }

    let mut buffer = VideoFrame::new(testing::CANVAS);
    let layout: LayoutSolution = vec![
        entry(0, rect((0, 1), (0, 1), (1, 2), (1, 1))),
        entry(1, rect((1, 2), (0, 1), (1, 2), (1, 1))),
    ];

    applier::compose(&registry, &mut buffer, &layout, true);

    // common range is [2, 4], both regions show timestamp 4
    assert_eq!(testing::y_at(&buffer, 5, 5), 4);
    assert_eq!(testing::y_at(&buffer, 37, 5), 4);

    assert_eq!(registry.channel(0).unwrap().sync_timestamps(), vec![4]);
    assert_eq!(registry.channel(1).unwrap().sync_timestamps(), vec![4, 5]);
}

#[test]
fn test_non_sync_inputs_use_freshest_frame() {
    testing::init();

    let registry = InputRegistry::new(1);
    let picture = Size {
        width: 16,
        height: 16,
    };
    feed(&registry, 0, picture, false, 1);
    feed(&registry, 0, picture, false, 2);

    let mut buffer = VideoFrame::new(testing::CANVAS);
    let layout: LayoutSolution = vec![entry(0, Rect::FULL)];

    applier::compose(&registry, &mut buffer, &layout, true);

    assert_eq!(testing::y_at(&buffer, 30, 20), 2);
}

#[test]
fn test_region_clamped_to_canvas() {
    testing::init();

    let registry = InputRegistry::new(1);
    feed(
        &registry,
        0,
        Size {
            width: 16,
            height: 16,
        },
        false,
        77,
    );

    let mut buffer = VideoFrame::new(testing::CANVAS);
    // left 1/2 plus width 2/3 overshoots the right edge
    let layout: LayoutSolution = vec![entry(0, rect((1, 2), (0, 1), (2, 3), (1, 1)))];

    applier::compose(&registry, &mut buffer, &layout, true);

    assert_eq!(testing::y_at(&buffer, 31, 5), 16);
    assert_eq!(testing::y_at(&buffer, 32, 5), 77);
    assert_eq!(testing::y_at(&buffer, 63, 35), 77);
}

#[test]
fn test_odd_coordinates_round_down_to_even() {
    testing::init();

    let registry = InputRegistry::new(1);
    feed(
        &registry,
        0,
        Size {
            width: 16,
            height: 16,
        },
        false,
        90,
    );

    let mut buffer = VideoFrame::new(testing::CANVAS);
    // left 3/64 of 64 is pixel 3, rounded down to 2
    let layout: LayoutSolution = vec![entry(0, rect((3, 64), (0, 1), (1, 2), (1, 1)))];

    applier::compose(&registry, &mut buffer, &layout, true);

    assert_eq!(testing::y_at(&buffer, 1, 5), 16);
    assert_eq!(testing::y_at(&buffer, 2, 5), 90);
    assert_eq!(testing::y_at(&buffer, 33, 5), 90);
    assert_eq!(testing::y_at(&buffer, 34, 5), 16);
}

#[test]
fn test_degenerate_rational_is_skipped() {
    testing::init();

    let registry = InputRegistry::new(1);
    feed(
        &registry,
        0,
        Size {
            width: 16,
            height: 16,
        },
        false,
        50,
    );

    let mut buffer = VideoFrame::new(testing::CANVAS);
    let layout: LayoutSolution = vec![entry(
        0,
        Rect {
            left: Rational::new(0, 0),
            top: Rational::ZERO,
            width: Rational::ONE,
            height: Rational::ONE,
        },
    )];

    applier::compose(&registry, &mut buffer, &layout, true);

    // nothing painted, nothing crashed
    assert_eq!(testing::y_at(&buffer, 30, 20), 16);
}
