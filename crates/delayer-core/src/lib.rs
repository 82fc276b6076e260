//! delayer-core
//!
//! Delayed task scheduling on top of a durable task store and a Redis-like cache.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, task, record, errors）
//! - **ports**: 抽象化レイヤー（TaskStore, DelayCache, Clock, IdGenerator）
//! - **impls**: 実装（InMemory / SQLite）
//! - **app**: アプリケーションロジック（scheduler, sweeper, client, consumer_loop, builder）
//! - **typed**: 型付きペイロード API（TaskKind, Handler, TypedRegistry, PayloadCodec）
//! - **config**: TOML 設定

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod typed;
