pub mod async_bag;
