pub const RECIPE_COUNT_PER_PAGE: i64 = 6;
pub const MAX_COUNT_PER_PAGE: i64 = 100;

pub const MINIMAL_AMOUNT: i32 = 1;
pub const MINIMAL_COOKING_TIME: i32 = 1;

pub const NAME_MAX_LENGTH: usize = 200;
pub const EMAIL_MAX_LENGTH: usize = 254;
pub const USER_FIELD_MAX_LENGTH: usize = 150;
pub const PASSWORD_MAX_LENGTH: usize = 150;
pub const COLOR_LENGTH: usize = 7;

pub const SESSION_LIFETIME_HOURS: i64 = 24;
pub const MAX_SESSION_LIFETIME_HOURS: i64 = 24 * 366;

pub const SHOPPING_LIST_TITLE: &str = "SHOPPING LIST";
pub const SHOPPING_LIST_CLOSING: &str = "Happy shopping and bon appetit! Your Foodgram";
pub const SHOPPING_LIST_FILENAME: &str = "shopping_list.txt";

pub const IMAGE_TYPES: &[(&str, &str)] = &[
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/jpg", "jpg"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
];
