// Hand-written to match migrations/2024-01-01-000000_init/up.sql.

diesel::table! {
    papers (id) {
        id -> Integer,
        doc_id -> Text,
        filename -> Text,
        stored_path -> Text,
        extracted_text -> Text,
        ocr_quality_label -> Text,
        content_id -> Nullable<Text>,
        ocr_quality_completed -> Bool,
        layout_completed -> Bool,
        metadata_llm_completed -> Bool,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    page_embeddings (id) {
        id -> Integer,
        doc_id -> Text,
        page_number -> Integer,
        page_text -> Text,
        vector -> Binary,
    }
}

diesel::table! {
    metadata (id) {
        id -> Integer,
        doc_id -> Text,
        title -> Nullable<Text>,
        authors -> Text,
        journal -> Nullable<Text>,
        year -> Nullable<Integer>,
        doi -> Nullable<Text>,
        abstract_text -> Nullable<Text>,
        keywords -> Text,
        extraction_method -> Text,
    }
}

diesel::table! {
    layout_analyses (id) {
        id -> Integer,
        doc_id -> Text,
        page_count -> Integer,
        total_elements -> Integer,
        element_types -> Text,
        pages -> Text,
    }
}

diesel::table! {
    file_hashes (file_md5) {
        file_md5 -> Text,
        file_size -> BigInt,
        original_filename -> Text,
        doc_id -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    content_hashes (content_digest) {
        content_digest -> Text,
        pdf_title -> Nullable<Text>,
        pdf_author -> Nullable<Text>,
        pdf_creator -> Nullable<Text>,
        first_three_pages_text -> Text,
        page_count -> Integer,
        doc_id -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    sample_embedding_hashes (embedding_digest, strategy) {
        embedding_digest -> Text,
        strategy -> Text,
        sample_text -> Text,
        vector_bytes -> Binary,
        dimension -> Integer,
        model_name -> Text,
        doc_id -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    detection_logs (detection_id) {
        detection_id -> Text,
        filename -> Text,
        file_size -> BigInt,
        result -> Text,
        layer -> Text,
        matched_doc_id -> Nullable<Text>,
        total_time_ms -> BigInt,
        l0_time_ms -> Nullable<BigInt>,
        l1_time_ms -> Nullable<BigInt>,
        l2_time_ms -> Nullable<BigInt>,
        estimated_time_saved_secs -> Nullable<Double>,
        error_message -> Nullable<Text>,
        created_at -> Text,
    }
}

diesel::table! {
    jobs (id) {
        id -> Integer,
        job_id -> Text,
        filename -> Text,
        source_path -> Text,
        status -> Text,
        current_step -> Nullable<Text>,
        progress_percent -> Integer,
        steps_completed -> Text,
        steps_failed -> Text,
        error_message -> Nullable<Text>,
        result_summary -> Nullable<Text>,
        paper_id -> Nullable<Text>,
        created_at -> Text,
        started_at -> Nullable<Text>,
        completed_at -> Nullable<Text>,
    }
}
