//! Prompt templates and fixed user-facing texts.

use crate::program::ProgramId;

/// System prompt for every answering call.
pub const SYSTEM_PROMPT: &str = "Ты консультант по магистерским программам Университета ИТМО \
\"Искусственный интеллект\" (AI) и \"Управление ИИ-продуктами\" (AI Product). \
Отвечай на русском языке, кратко и по делу, опираясь только на предоставленный контекст. \
Если в контексте нет ответа, честно скажи об этом и предложи посмотреть страницу программы. \
Не выдумывай названия курсов, сроки и цифры.";

/// Classifier prompt for the relevance gate.
pub const RELEVANCE_PROMPT: &str = "Определи, относится ли вопрос пользователя к магистерским \
программам ИТМО AI и AI Product: обучение, курсы, учебный план, поступление, стоимость, \
карьера выпускников, выбор между программами. Ответь одним словом: \"да\" или \"нет\".";

/// Reply for questions outside the two programs.
pub const REJECTION_MESSAGE: &str = "Извините, я могу отвечать только на вопросы о магистерских \
программах ИТМО по направлениям AI и AI Product.\n\n\
Примеры вопросов, на которые я могу ответить:\n\
• Какие курсы есть на программе AI?\n\
• Чем отличаются программы AI и AI Product?\n\
• Какие выборные дисциплины лучше взять для NLP?\n\
• Какие требования для поступления?";

/// Context placeholder when retrieval found nothing.
pub const NO_CONTEXT: &str = "Релевантная информация не найдена в базе знаний.";

/// Apology when answer generation fails.
pub const GENERATION_FAILED: &str =
    "Произошла ошибка при генерации ответа. Пожалуйста, попробуйте ещё раз.";

/// Apology when recommendations cannot be produced at all.
pub const RECOMMENDATIONS_FAILED: &str = "К сожалению, не удалось получить рекомендации. \
Попробуйте уточнить ваши интересы или задать конкретный вопрос о курсах.";

/// Greeting shown on `/start`.
pub const ONBOARDING: &str = "Привет! Я помогу разобраться в магистерских программах ИТМО \
\"Искусственный интеллект\" и \"Управление ИИ-продуктами\".\n\n\
Я могу:\n\
• рассказать об учебных планах и курсах;\n\
• сравнить программы;\n\
• подобрать выборные дисциплины под твой бэкграунд.\n\n\
Выбери действие в меню или просто задай вопрос.";

/// `/help` text.
pub const HELP: &str = "Команды бота:\n\n\
/start - Начать диалог\n\
/compare - Сравнить программы AI и AI Product\n\
/recommend - Получить рекомендации по курсам\n\
/profile - Показать профиль\n\
/reset - Сбросить профиль\n\
/help - Показать эту справку\n\n\
Примеры вопросов:\n\
- Какие курсы есть на программе AI?\n\
- Чем отличается AI от AI Product?\n\
- Какие выборные курсы взять, если интересует NLP?\n\
- Какой бэкграунд нужен для поступления?";

/// Static comparison used when retrieval or generation fails.
pub const FALLBACK_COMPARISON: &str = "Сравнение магистерских программ ИТМО\n\n\
AI (Искусственный интеллект)\n\
• Фокус: глубокое погружение в ML/DL и исследования\n\
• Для кого: разработчики, исследователи, будущие ML-инженеры\n\n\
AI Product (Управление ИИ-продуктами)\n\
• Фокус: применение AI в продуктах и управление AI-проектами\n\
• Для кого: продакт-менеджеры, предприниматели, техлиды\n\n\
Как выбрать:\n\
→ Хотите строить модели и проводить исследования? → AI\n\
→ Хотите создавать продукты на основе AI и управлять командами? → AI Product\n\n\
Для более детальной информации задайте конкретный вопрос!";

/// Instruction appended to the comparison context.
pub const COMPARISON_INSTRUCTION: &str = "На основе предоставленной информации сравни две \
магистерские программы ИТМО.\n\n\
Структура ответа:\n\
1. Краткое описание каждой программы (2-3 предложения)\n\
2. Ключевые различия: фокус обучения, основные курсы, целевая аудитория, карьерные траектории\n\
3. Кому подходит программа \"AI\": профиль кандидата и необходимый бэкграунд\n\
4. Кому подходит программа \"AI Product\": профиль кандидата и необходимый бэкграунд\n\
5. Рекомендация: как выбрать между программами";

/// Retrieval query for the admission flow.
pub const ADMISSION_QUERY: &str = "требования поступление документы экзамены";

/// Retrieval query for each program during comparison.
pub fn comparison_query(program: ProgramId) -> &'static str {
    match program {
        ProgramId::Ai => "программа AI машинное обучение курсы",
        ProgramId::AiProduct => "программа AI Product продукт менеджмент",
    }
}

/// User turn for a plain question.
pub fn question_prompt(context: &str, question: &str) -> String {
    format!(
        "Контекст из базы знаний:\n{context}\n\n\
         Вопрос пользователя: {question}\n\n\
         Ответь на вопрос, используя информацию из контекста. \
         Если информации недостаточно, честно скажи об этом."
    )
}

/// User turn for the admission flow.
pub fn admission_prompt(context: &str) -> String {
    format!(
        "На основе контекста расскажи о требованиях для поступления на магистерские программы.\n\n\
         Контекст:\n{context}\n\n\
         Структура ответа:\n\
         1. Общие требования\n\
         2. Необходимые документы\n\
         3. Вступительные испытания (если есть)\n\
         4. Сроки подачи документов\n\
         5. Полезные ссылки\n\n\
         Если какой-то информации нет в контексте, укажи это."
    )
}

/// Static admission reply with both program pages.
pub fn fallback_admission() -> String {
    format!(
        "Для получения актуальной информации о поступлении рекомендую \
         посетить официальные страницы программ:\n\n\
         • AI: {}\n\
         • AI Product: {}",
        ProgramId::Ai.default_url(),
        ProgramId::AiProduct.default_url()
    )
}

/// User turn asking the model to expand the recommender's ranked list.
pub fn enrich_recommendations_prompt(
    background: &str,
    interests: &[String],
    ranked: &str,
) -> String {
    format!(
        "На основе профиля пользователя и базовых рекомендаций дай развёрнутый \
         персонализированный совет.\n\n\
         Профиль пользователя:\n\
         - Бэкграунд: {background}\n\
         - Интересы: {}\n\n\
         Базовые рекомендации системы:\n{ranked}\n\n\
         Дополни рекомендации:\n\
         1. Объясни, почему именно эти курсы подходят данному студенту\n\
         2. Дай советы по подготовке к сложным курсам\n\
         3. Укажи, какие навыки помогут в карьере\n\n\
         Сохрани структуру базовых рекомендаций, дополнив их.",
        join_or(interests, "Общие")
    )
}

/// User turn for recommendations built from retrieved course text.
pub fn retrieval_recommendations_prompt(
    background: &str,
    interests: &[String],
    context: &str,
) -> String {
    format!(
        "Подбери выборные курсы для студента.\n\n\
         Бэкграунд: {background}\n\
         Интересы: {}\n\n\
         Информация о курсах:\n{context}\n\n\
         Назови 3-5 подходящих курсов из контекста, порядок их изучения \
         и навыки, которые они дают. Не упоминай курсы, которых нет в контексте.",
        join_or(interests, "Общие")
    )
}

fn join_or(items: &[String], fallback: &str) -> String {
    if items.is_empty() {
        fallback.to_string()
    } else {
        items.join(", ")
    }
}
