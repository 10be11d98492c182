pub mod author;
pub mod book;
pub mod book_pack;
pub mod book_pack_book;
pub mod book_tag;
pub mod order;
pub mod order_item;
pub mod shipping_event;
pub mod tag;
pub mod user;
