//! Schema of the content tables the tests run the state machine against.

#![allow(dead_code)]

table! {
    articles (id) {
        id -> Integer,
        title -> Varchar,
        body -> Text,
        view_count -> Integer,
        is_published -> Bool,
        published_counterpart -> Nullable<Integer>,
        published_at -> Nullable<Timestamp>,
        deletion_requested -> Bool,
    }
}

table! {
    article_attachments (id) {
        id -> Integer,
        article -> Integer,
        name -> Varchar,
    }
}

table! {
    tags (id) {
        id -> Integer,
        name -> Varchar,
    }
}

table! {
    article_tags (article, tag) {
        article -> Integer,
        tag -> Integer,
    }
}

table! {
    article_links (id) {
        id -> Integer,
        article -> Integer,
        name -> Varchar,
    }
}

table! {
    pages (id) {
        id -> Integer,
        template -> Varchar,
        is_published -> Bool,
        published_counterpart -> Nullable<Integer>,
        published_at -> Nullable<Timestamp>,
        deletion_requested -> Bool,
    }
}

table! {
    page_translations (id) {
        id -> Integer,
        master -> Integer,
        language_code -> Varchar,
        title -> Varchar,
        body -> Text,
        is_published -> Bool,
        published_counterpart -> Nullable<Integer>,
        published_at -> Nullable<Timestamp>,
        deletion_requested -> Bool,
    }
}

table! {
    page_links (id) {
        id -> Integer,
        page -> Integer,
        name -> Varchar,
    }
}
