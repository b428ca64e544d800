//! Monomorphic entry points handed to the closure runtime.
//!
//! Each store operation is written once, generically over the execution
//! context, and instantiated here as an (application, validator) pair with
//! identical logic.

use scee::{run2, AppCtx, ValCtx};

use crate::map::{kv_del, kv_get, kv_set, KvStore};
use crate::types::{Key, Lookup, RetCode, Val};

#[derive(Clone, Copy)]
pub struct StoreArgs {
    pub store: &'static KvStore,
    pub key: Key,
}

#[derive(Clone, Copy)]
pub struct SetArgs {
    pub store: &'static KvStore,
    pub key: Key,
    pub val: Val,
}

pub fn hashmap_get_app(ctx: &mut AppCtx, args: StoreArgs) -> Lookup {
    kv_get(ctx, args.store, args.key)
}

pub fn hashmap_get_val(ctx: &mut ValCtx<'_>, args: StoreArgs) -> Lookup {
    kv_get(ctx, args.store, args.key)
}

pub fn hashmap_set_app(ctx: &mut AppCtx, args: SetArgs) -> RetCode {
    kv_set(ctx, args.store, args.key, args.val)
}

pub fn hashmap_set_val(ctx: &mut ValCtx<'_>, args: SetArgs) -> RetCode {
    kv_set(ctx, args.store, args.key, args.val)
}

pub fn hashmap_del_app(ctx: &mut AppCtx, args: StoreArgs) -> RetCode {
    kv_del(ctx, args.store, args.key)
}

pub fn hashmap_del_val(ctx: &mut ValCtx<'_>, args: StoreArgs) -> RetCode {
    kv_del(ctx, args.store, args.key)
}

pub fn checked_get(store: &'static KvStore, key: Key) -> Lookup {
    run2(hashmap_get_app, hashmap_get_val, StoreArgs { store, key })
}

pub fn checked_set(store: &'static KvStore, key: Key, val: Val) -> RetCode {
    run2(hashmap_set_app, hashmap_set_val, SetArgs { store, key, val })
}

pub fn checked_del(store: &'static KvStore, key: Key) -> RetCode {
    run2(hashmap_del_app, hashmap_del_val, StoreArgs { store, key })
}
