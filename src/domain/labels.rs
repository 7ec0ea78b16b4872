// ============================================================
// Layer 3: Cityscapes Label Table
// ============================================================
// Cityscapes ships its annotations as labelIds (0..=33, plus -1
// for licence plates). Only 19 of those classes are evaluated;
// they are renumbered to the contiguous trainIds 0..=18 and every
// other id becomes the ignore value.
//
//   labelId  7 (road)     -> trainId 0
//   labelId 26 (car)      -> trainId 13
//   labelId  0 (unlabeled)-> IGNORE_INDEX
//
// The palette is indexed by trainId and is used to colour
// predicted masks.

/// Value used for pixels that belong to no training class.
pub const IGNORE_INDEX: u8 = 255;

/// Number of evaluated Cityscapes classes
pub const NUM_TRAIN_CLASSES: usize = 19;

/// labelId -> trainId, indexed by labelId (0..=33).
const LABEL_TO_TRAIN: [u8; 34] = [
    255, 255, 255, 255, 255, 255, 255, //  0-6  void / flat-ish unlabeled
    0,   1,                            //  7-8  road, sidewalk
    255, 255,                          //  9-10 parking, rail track
    2,   3,   4,                       // 11-13 building, wall, fence
    255, 255, 255,                     // 14-16 guard rail, bridge, tunnel
    5,                                 // 17    pole
    255,                               // 18    polegroup
    6,   7,   8,   9,   10,            // 19-23 light, sign, vegetation, terrain, sky
    11,  12,  13,  14,  15,            // 24-28 person, rider, car, truck, bus
    255, 255,                          // 29-30 caravan, trailer
    16,  17,  18,                      // 31-33 train, motorcycle, bicycle
];

/// Class names indexed by trainId
pub const CLASS_NAMES: [&str; NUM_TRAIN_CLASSES] = [
    "road", "sidewalk", "building", "wall", "fence", "pole",
    "traffic light", "traffic sign", "vegetation", "terrain", "sky",
    "person", "rider", "car", "truck", "bus", "train", "motorcycle", "bicycle",
];

/// Official Cityscapes colours indexed by trainId
pub const PALETTE: [[u8; 3]; NUM_TRAIN_CLASSES] = [
    [128, 64, 128], [244, 35, 232], [70, 70, 70], [102, 102, 156],
    [190, 153, 153], [153, 153, 153], [250, 170, 30], [220, 220, 0],
    [107, 142, 35], [152, 251, 152], [70, 130, 180], [220, 20, 60],
    [255, 0, 0], [0, 0, 142], [0, 0, 70], [0, 60, 100],
    [0, 80, 100], [0, 0, 230], [119, 11, 32],
];

/// Map a raw labelId to its trainId, or `ignore` when the id is
/// not an evaluated class (or out of range).
pub fn label_to_train_id(label_id: u8, ignore: u8) -> u8 {
    match LABEL_TO_TRAIN.get(label_id as usize) {
        Some(&IGNORE_INDEX) | None => ignore,
        Some(&train_id)            => train_id,
    }
}

/// Human-readable class name; falls back to `class_<id>` for ids
/// beyond the Cityscapes table (custom `num_classes`).
pub fn class_name(train_id: usize) -> String {
    CLASS_NAMES
        .get(train_id)
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("class_{train_id}"))
}

/// Colour for a trainId. Unknown ids are painted black.
pub fn colour_of(train_id: usize) -> [u8; 3] {
    PALETTE.get(train_id).copied().unwrap_or([0, 0, 0])
}
